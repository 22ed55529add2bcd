mod types;

pub use types::*;

use std::path::Path;

impl Config {
    /// Loads `path` as TOML if given, falling back to defaults on a missing
    /// file (info-logged) or a parse failure (warn-logged). A config file is
    /// always optional; CLI flags apply on top afterward.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(err) => {
                tracing::info!(path = %path.display(), error = %err, "no config file found, using defaults");
                return Self::default();
            }
        };
        match toml::from_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to parse config file, using defaults");
                Self::default()
            }
        }
    }

    /// Non-fatal configuration warnings; callers log these and continue.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.segment_seconds <= 0.0 {
            warnings.push(format!(
                "segment_seconds is {}, must be positive; falling back to 6.0",
                self.segment_seconds
            ));
        }
        if !self.root.exists() {
            warnings.push(format!("root directory {:?} does not exist", self.root));
        }
        if let Some(basic) = &self.basic {
            if basic.realm.is_empty() {
                warnings.push("basic auth realm is empty".to_string());
            }
        }
        if let Some(digest) = &self.digest {
            if digest.realm.is_empty() {
                warnings.push("digest auth realm is empty".to_string());
            }
        }
        if self.keys.is_some() && self.ports.https == 0 {
            warnings.push("--keys given but https port is 0".to_string());
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_or_default_falls_back_when_path_is_none() {
        let config = Config::load_or_default(None);
        assert_eq!(config.segment_seconds, 6.0);
    }

    #[test]
    fn load_or_default_falls_back_on_missing_file() {
        let config = Config::load_or_default(Some(Path::new("/nonexistent/boxfile.toml")));
        assert_eq!(config.ports.http, 4555);
    }

    #[test]
    fn validate_flags_nonpositive_segment_duration() {
        let mut config = Config::default();
        config.segment_seconds = 0.0;
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("segment_seconds")));
    }

    #[test]
    fn validate_flags_empty_realm() {
        let mut config = Config::default();
        config.basic = Some(AuthCredential {
            username: "a".to_string(),
            password: "b".to_string(),
            realm: String::new(),
        });
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("basic auth realm")));
    }
}
