mod egress;
mod ingress;
mod transcode;

pub use egress::{Egress, EgressHandle};
pub use ingress::spawn_ingress;
