// Domain layer: account models, DN/notes helpers and the ports implemented by adapters.

pub mod dn;
pub mod model;
pub mod notes;
pub mod ports;
