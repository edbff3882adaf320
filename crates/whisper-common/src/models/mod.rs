//! Data model — identities, devices, sessions, and the volatile-store records
//! that back the connection lifecycle.

pub mod backup;
pub mod call;
pub mod challenge;
pub mod device;
pub mod identity;
pub mod message;
pub mod presence;
pub mod rate;
pub mod session;

use serde::{Deserialize, Serialize};

/// Client platform tag, carried on device registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Ios => write!(f, "ios"),
            Platform::Android => write!(f, "android"),
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ios" => Ok(Platform::Ios),
            "android" => Ok(Platform::Android),
            _ => Err(()),
        }
    }
}
