mod client;
mod envelope;
mod ice;

pub use client::{ClientId, Speaker, EXTERNAL_SPEAKER_NAME, EXTERNAL_WIRE_ID, SERVER_WIRE_ID};
pub use envelope::{ClientInfo, Envelope, PttWireState};
pub use ice::{CandidateJson, IceServerConfig};
