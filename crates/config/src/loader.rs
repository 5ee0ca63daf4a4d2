use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::{
    error::{Error, Result},
    schema::GatewayConfig,
};

/// File name looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "ampgate.toml";

pub fn from_toml_str(text: &str) -> Result<GatewayConfig> {
    Ok(toml::from_str(text)?)
}

fn read(path: &Path) -> Result<GatewayConfig> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = from_toml_str(&text)?;
    info!(path = %path.display(), "loaded configuration");
    Ok(config)
}

/// Load the configuration.
///
/// An explicit `path` must exist. Without one, `./ampgate.toml` is used if
/// present, otherwise the defaults. The result is not validated; endpoint
/// overrides are usually applied first.
pub fn load(path: Option<&Path>) -> Result<GatewayConfig> {
    match path {
        Some(path) => read(path),
        None => {
            let candidate = PathBuf::from(DEFAULT_CONFIG_FILE);
            if candidate.is_file() {
                read(&candidate)
            } else {
                debug!("no configuration file, using defaults");
                Ok(GatewayConfig::default())
            }
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {
        super::*,
        ampgate_amp::ValueKind,
        std::{io::Write, time::Duration},
    };

    const SAMPLE: &str = r#"
[gateway]
netstring = "tcp:port=7000:interface=127.0.0.1"
websocket = "tcp:7001"
backend = "tcp:host=calculator:port=9000"

[limits]
max_in_flight = 4

[timeouts]
call_ms = 1500

[commands.Add]
arguments = ["a", "b"]
response = { sum = "integer" }

[commands.Greet]
arguments = ["names"]
response = { greetings = "list<unicode>" }
"#;

    #[test]
    fn parses_full_file() {
        let config = from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.gateway.netstring.unwrap().port, 7000);
        assert_eq!(config.gateway.websocket.unwrap().port, 7001);
        assert_eq!(config.gateway.backend.as_ref().unwrap().host, "calculator");
        assert_eq!(config.limits.max_in_flight, 4);
        assert_eq!(config.limits.max_frame_bytes, 524_288);
        assert_eq!(config.timeouts.call(), Duration::from_millis(1500));
        assert_eq!(config.timeouts.connect(), Duration::from_secs(10));

        let add = &config.commands["Add"];
        assert_eq!(add.arguments, ["a", "b"]);
        assert_eq!(add.response["sum"], ValueKind::Integer);
        assert_eq!(
            config.commands["Greet"].response["greetings"],
            ValueKind::List(Box::new(ValueKind::Text))
        );
        config.validate().unwrap();
    }

    #[test]
    fn empty_file_is_defaults() {
        assert_eq!(from_toml_str("").unwrap(), GatewayConfig::default());
    }

    #[test]
    fn rejects_bad_endpoint() {
        let err = from_toml_str("[gateway]\nnetstring = \"unix:/tmp/x\"\n").unwrap_err();
        assert!(matches!(err, Error::Toml(_)));
        assert!(err.to_string().contains("unsupported endpoint type"), "{err}");
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(from_toml_str("[gateway]\nlisten = \"tcp:1\"\n").is_err());
        assert!(from_toml_str("[commands.Add]\nargs = []\n").is_err());
    }

    #[test]
    fn rejects_unknown_value_kind() {
        assert!(from_toml_str("[commands.Add]\nresponse = { ok = \"boolean\" }\n").is_err());
    }

    #[test]
    fn load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.limits.max_in_flight, 4);
    }

    #[test]
    fn load_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
