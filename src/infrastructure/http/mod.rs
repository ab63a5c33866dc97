//! Outbound HTTP for api_call steps

mod reqwest_client;

pub use reqwest_client::ReqwestHttpClient;
