//! Container fixtures for `sso-ha inflate`.
//!
//! ```toml
//! [[application]]
//! context_path = "/shop"
//! sessions = ["s1", "s2"]
//!
//! [[application]]
//! context_path = "/admin"
//! unavailable = "session store offline"
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use sso_ha_core::container::StaticContainer;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionFixture {
    #[serde(default, rename = "application")]
    pub applications: Vec<ApplicationFixture>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplicationFixture {
    pub context_path: String,
    #[serde(default)]
    pub sessions: Vec<String>,
    /// Make every lookup against this application fail with this reason.
    #[serde(default)]
    pub unavailable: Option<String>,
}

impl SessionFixture {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading session fixture {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing session fixture {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn build_container(&self) -> StaticContainer {
        let container = StaticContainer::new();
        for app in &self.applications {
            let manager = container.deploy(app.context_path.clone());
            for id in &app.sessions {
                manager.create_session(id.clone());
            }
            manager.set_outage(app.unavailable.clone());
        }
        container
    }
}
