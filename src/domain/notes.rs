use chrono::{Local, NaiveDateTime};

/// AD 的 Notes（info）欄位以 CRLF 分行
pub const NOTE_SEPARATOR: &str = "\r\n";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// 測試用固定時間
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// `2026-10-16 09:30:00 - <message>`
pub fn stamp(clock: &dyn Clock, message: &str) -> String {
    format!("{} - {}", clock.now().format(TIMESTAMP_FORMAT), message)
}

/// 附加一行到 notes 結尾，既有內容不會被截斷或改寫。
pub fn append_line(notes: &mut String, line: &str) {
    if !notes.is_empty() && !notes.ends_with('\n') {
        notes.push_str(NOTE_SEPARATOR);
    }
    notes.push_str(line);
    notes.push_str(NOTE_SEPARATOR);
}

pub fn lines(notes: &str) -> impl Iterator<Item = &str> {
    notes.lines().filter(|l| !l.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn fixed() -> FixedClock {
        FixedClock(
            NaiveDate::from_ymd_opt(2026, 10, 16)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
        )
    }

    #[test]
    fn test_stamp_format() {
        assert_eq!(
            stamp(&fixed(), "Account disabled"),
            "2026-10-16 09:30:00 - Account disabled"
        );
    }

    #[test]
    fn test_append_keeps_prior_content() {
        let mut notes = String::new();
        append_line(&mut notes, "A");
        append_line(&mut notes, "B");
        assert_eq!(notes, "A\r\nB\r\n");
        assert_eq!(lines(&notes).collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn test_append_after_hand_edited_notes() {
        let mut notes = "edited in ADUC".to_string();
        append_line(&mut notes, "next");
        assert_eq!(notes, "edited in ADUC\r\nnext\r\n");
    }
}
