// src/profile.rs
use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::MonitorError;

// 病人资料 (由外部存储负责持久化)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub blood_group: String,
    #[serde(default)]
    pub weight_kg: Option<f32>,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub age: Option<u8>,
}

impl Profile {
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.id.trim().is_empty() {
            return Err(MonitorError::InvalidProfile("id must not be empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(MonitorError::InvalidProfile("name must not be empty".into()));
        }
        if let Some(age) = self.age {
            if age > 130 {
                return Err(MonitorError::InvalidProfile(format!("implausible age {age}")));
            }
        }
        if let Some(weight) = self.weight_kg {
            if !weight.is_finite() || weight <= 0.0 || weight > 500.0 {
                return Err(MonitorError::InvalidProfile(format!(
                    "implausible weight {weight} kg"
                )));
            }
        }
        Ok(())
    }
}

/// Load/save contract for patient profiles. Durable storage lives outside
/// this crate; implementations decide where profiles go.
pub trait ProfileStore {
    fn load_profile(&self, id: &str) -> Result<Option<Profile>, MonitorError>;
    fn save_profile(&self, profile: &Profile) -> Result<(), MonitorError>;
}

/// Keeps profiles for the life of the process only.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<HashMap<String, Profile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileStore for MemoryProfileStore {
    fn load_profile(&self, id: &str) -> Result<Option<Profile>, MonitorError> {
        Ok(self.profiles.read().get(id).cloned())
    }

    fn save_profile(&self, profile: &Profile) -> Result<(), MonitorError> {
        profile.validate()?;
        self.profiles
            .write()
            .insert(profile.id.clone(), profile.clone());
        log::info!("profile {} saved", profile.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> Profile {
        Profile {
            id: "user_42".into(),
            name: "A. Patient".into(),
            blood_group: "O+".into(),
            weight_kg: Some(68.5),
            gender: "female".into(),
            age: Some(54),
        }
    }

    #[test]
    fn saved_profile_loads_back() {
        let store = MemoryProfileStore::new();
        assert_eq!(store.load_profile("user_42").unwrap(), None);
        store.save_profile(&profile()).unwrap();
        assert_eq!(store.load_profile("user_42").unwrap(), Some(profile()));
    }

    #[test]
    fn invalid_profile_is_not_saved() {
        let store = MemoryProfileStore::new();
        let mut bad = profile();
        bad.name = "  ".into();
        assert!(matches!(store.save_profile(&bad), Err(MonitorError::InvalidProfile(_))));
        bad = profile();
        bad.weight_kg = Some(-1.0);
        assert!(store.save_profile(&bad).is_err());
        assert_eq!(store.load_profile("user_42").unwrap(), None);
    }

    #[test]
    fn profile_reads_dashboard_json() {
        let parsed: Profile = serde_json::from_str(
            r#"{"id": "u1", "name": "B", "bloodGroup": "A-",
                "weightKg": 80, "gender": "male", "age": 31}"#,
        )
        .unwrap();
        assert_eq!(parsed.blood_group, "A-");
        assert_eq!(parsed.weight_kg, Some(80.0));
        assert!(parsed.validate().is_ok());
    }
}
