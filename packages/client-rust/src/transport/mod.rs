//! [`HttpTransport`](crate::traits::HttpTransport) implementations.

pub mod reqwest_transport;
pub mod scripted;

pub use reqwest_transport::ReqwestTransport;
pub use scripted::{RecordedRequest, ScriptedResponse, ScriptedTransport};
