use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumIs)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Running {
        pid: u32,
        /// `None` when the profile file is missing
        profile: Option<String>,
    },
    NotRunning,
}

impl InstanceStatus {
    pub fn style(&self) -> String {
        let s = self.to_string();
        match self {
            InstanceStatus::Running { .. } => console::style(s).green().to_string(),
            InstanceStatus::NotRunning => console::style(s).dim().to_string(),
        }
    }
}
