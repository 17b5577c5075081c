use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{info, warn};

use super::{ConnectionConfig, ConnectionOverrides, SearchPaths, trim_url};
use crate::auth::ApiKey;
use crate::error::{Error, Result};
use crate::settings::ClientSettings;
use crate::transport::Transport;

/// Resolves [`ConnectionConfig`] values from an `mcp.json` file.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    search: SearchPaths,
    settings: ClientSettings,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new(ClientSettings::default())
    }
}

impl ConfigLoader {
    /// Creates a loader searching the process working and home directories.
    #[must_use]
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            search: SearchPaths::from_env(),
            settings,
        }
    }

    /// Replaces the directories used for discovery.
    #[must_use]
    pub fn with_search_paths(mut self, search: SearchPaths) -> Self {
        self.search = search;
        self
    }

    /// Returns the settings supplying defaults.
    #[must_use]
    pub const fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Finds the config file; `None` is a normal outcome.
    #[must_use]
    pub fn locate(&self, explicit: Option<&Path>) -> Option<PathBuf> {
        self.search.locate(&self.settings.config_file_name, explicit)
    }

    /// Resolves the configuration of one server.
    ///
    /// The alias is `server`, else the file's `default_server`, else
    /// `"default"` when such an entry exists.
    ///
    /// # Errors
    ///
    /// - [`Error::ConfigNotFound`] when no file is located.
    /// - [`Error::ConfigRead`] when the file cannot be read.
    /// - [`Error::DataFormat`] for malformed JSON or a malformed entry.
    /// - [`Error::ConfigMissing`] when no alias resolves or the entry is
    ///   absent.
    /// - [`Error::UnsupportedTransport`] for an unknown transport label.
    pub fn load(
        &self,
        server: Option<&str>,
        explicit: Option<&Path>,
        overrides: ConnectionOverrides,
    ) -> Result<ConnectionConfig> {
        let source = explicit.map_or_else(|| "search".to_owned(), |p| p.display().to_string());
        info!(
            server = server.unwrap_or("default"),
            path = %source,
            "loading MCP configuration"
        );

        let file = self.read(explicit)?;
        let alias = file.target_alias(server)?;
        let entry = file.server(&alias)?;
        let parsed = ServerEntry::parse(&file.path, &alias, entry)?;
        info!(server = %alias, transport = %parsed.transport, "loaded server configuration");

        Ok(parsed.resolve(overrides, &self.settings))
    }

    /// Resolves every server in the file, ordered by alias.
    ///
    /// # Errors
    ///
    /// Same as [`ConfigLoader::load`], for the first entry that fails.
    pub fn load_all(&self, explicit: Option<&Path>) -> Result<Vec<(String, ConnectionConfig)>> {
        let file = self.read(explicit)?;
        let servers = file.servers()?;

        let mut configs = Vec::with_capacity(servers.len());
        for alias in servers.keys() {
            let entry = file.server(alias)?;
            let parsed = ServerEntry::parse(&file.path, alias, entry)?;
            configs.push((
                alias.clone(),
                parsed.resolve(ConnectionOverrides::default(), &self.settings),
            ));
        }
        configs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(configs)
    }

    fn read(&self, explicit: Option<&Path>) -> Result<ConfigFile> {
        let path = self.locate(explicit).ok_or_else(|| Error::ConfigNotFound {
            explicit: explicit.map(Path::to_path_buf),
        })?;
        info!(path = %path.display(), "reading MCP configuration file");

        let text = std::fs::read_to_string(&path).map_err(|source| Error::ConfigRead {
            path: path.clone(),
            source,
        })?;
        let root: Value = serde_json::from_str(&text)
            .map_err(|e| Error::data_format(&path, format!("invalid JSON: {e}")))?;

        Ok(ConfigFile { path, root })
    }
}

struct ConfigFile {
    path: PathBuf,
    root: Value,
}

impl ConfigFile {
    fn target_alias(&self, explicit: Option<&str>) -> Result<String> {
        if let Some(alias) = explicit.filter(|a| !a.is_empty()) {
            return Ok(alias.to_owned());
        }

        let alias = match self.root.get("default_server") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                return Err(Error::data_format(
                    &self.path,
                    format!("'default_server' must be a string, got {}", type_name(other)),
                ));
            }
        };

        let alias = match alias {
            Some(alias) => alias,
            None if self.has_server("default") => "default".to_owned(),
            None => {
                return Err(Error::config_missing(format!(
                    "no server name specified and no 'default_server' key or 'default' server found in '{}'",
                    self.path.display()
                )));
            }
        };
        info!(server = %alias, "using default server configuration");
        Ok(alias)
    }

    fn has_server(&self, alias: &str) -> bool {
        self.root
            .get("servers")
            .and_then(Value::as_object)
            .is_some_and(|s| s.contains_key(alias))
    }

    fn servers(&self) -> Result<&Map<String, Value>> {
        self.root
            .get("servers")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                Error::config_missing(format!(
                    "missing or invalid 'servers' object in '{}'",
                    self.path.display()
                ))
            })
    }

    fn server(&self, alias: &str) -> Result<&Map<String, Value>> {
        self.servers()?
            .get(alias)
            .and_then(Value::as_object)
            .ok_or_else(|| {
                Error::config_missing(format!(
                    "server configuration '{alias}' not found or is not an object in '{}'",
                    self.path.display()
                ))
            })
    }
}

/// File-sourced values of one server entry, after shape validation.
#[derive(Debug, Default)]
struct ServerEntry {
    transport: Transport,
    base_url: Option<String>,
    command: Option<String>,
    args: Option<Vec<String>>,
    api_key: Option<ApiKey>,
    timeout: Option<Duration>,
    headers: Option<HashMap<String, String>>,
    parameters: Option<Map<String, Value>>,
}

impl ServerEntry {
    fn parse(path: &Path, alias: &str, entry: &Map<String, Value>) -> Result<Self> {
        let invalid = |message: String| Error::data_format(path, message);

        let transport = match entry.get("transport") {
            None | Some(Value::Null) => Transport::default(),
            Some(Value::String(label)) => label.parse::<Transport>().map_err(|_| {
                Error::unsupported_transport(format!(
                    "unsupported transport protocol '{label}' for server '{alias}'"
                ))
            })?,
            Some(other) => {
                return Err(invalid(format!(
                    "'transport' for server '{alias}' must be a string, got {}",
                    type_name(other)
                )));
            }
        };

        let mut parsed = Self {
            transport,
            ..Self::default()
        };

        match transport {
            Transport::Stdio => {
                parsed.command = match entry.get("command") {
                    Some(Value::String(c)) if !c.is_empty() => Some(c.clone()),
                    None | Some(Value::Null) | Some(Value::String(_)) => {
                        return Err(invalid(format!(
                            "missing 'command' for stdio transport in server '{alias}'"
                        )));
                    }
                    Some(_) => {
                        return Err(invalid(format!(
                            "invalid 'command' format for stdio transport in server '{alias}', expected a string"
                        )));
                    }
                };
                parsed.args = parse_args(entry.get("args")).map_err(|()| {
                    invalid(format!(
                        "invalid 'args' format for stdio transport in server '{alias}', expected a list of strings"
                    ))
                })?;
            }
            Transport::Sse | Transport::Http => {
                parsed.base_url = match entry.get("base_url") {
                    Some(Value::String(url)) if !url.is_empty() => Some(trim_url(url.clone())),
                    _ => {
                        return Err(invalid(format!(
                            "missing or invalid 'base_url' (string) for server '{alias}' with transport '{transport}'"
                        )));
                    }
                };
            }
        }

        parsed.timeout = match entry.get("timeout") {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => {
                let secs = n.as_f64().unwrap_or(-1.0);
                Some(Duration::try_from_secs_f64(secs).map_err(|_| {
                    if secs.is_finite() && secs > 0.0 {
                        invalid(format!(
                            "'timeout' for server '{alias}' is out of range: {secs} seconds"
                        ))
                    } else {
                        invalid(format!(
                            "'timeout' for server '{alias}' must be a non-negative number of seconds"
                        ))
                    }
                })?)
            }
            Some(other) => {
                return Err(invalid(format!(
                    "'timeout' for server '{alias}' must be a number, got {}",
                    type_name(other)
                )));
            }
        };

        parsed.api_key = match entry.get("api_key") {
            None | Some(Value::Null) => None,
            Some(Value::String(raw)) => Some(ApiKey::parse(raw)),
            Some(other) => {
                warn!(server = %alias, kind = type_name(other), "ignoring non-string 'api_key'");
                None
            }
        };

        parsed.headers = parse_headers(alias, entry.get("default_headers"));
        parsed.parameters = match entry.get("default_parameters") {
            None | Some(Value::Null) => None,
            Some(Value::Object(params)) => Some(params.clone()),
            Some(other) => {
                warn!(
                    server = %alias,
                    kind = type_name(other),
                    "invalid 'default_parameters' format, expected an object; ignoring"
                );
                None
            }
        };

        Ok(parsed)
    }

    /// Applies caller overrides, then built-in defaults, field by field.
    fn resolve(
        self,
        overrides: ConnectionOverrides,
        settings: &ClientSettings,
    ) -> ConnectionConfig {
        let mut headers = self.headers.unwrap_or_default();
        headers.extend(overrides.default_headers.unwrap_or_default());

        let mut default_parameters = self.parameters.unwrap_or_default();
        default_parameters.extend(overrides.default_parameters.unwrap_or_default());

        let transport = overrides.transport.unwrap_or(self.transport);
        let (base_url, command, args) = match transport {
            Transport::Stdio => (
                None,
                overrides.command.or(self.command),
                overrides.args.or(self.args).unwrap_or_default(),
            ),
            Transport::Sse | Transport::Http => (
                overrides.base_url.map(trim_url).or(self.base_url),
                None,
                Vec::new(),
            ),
        };

        ConnectionConfig {
            transport,
            base_url,
            command,
            args,
            timeout: overrides
                .timeout
                .or(self.timeout)
                .filter(|t| !t.is_zero())
                .unwrap_or(settings.timeout),
            api_key: overrides.api_key.or(self.api_key),
            headers,
            default_parameters,
        }
    }
}

fn parse_args(value: Option<&Value>) -> std::result::Result<Option<Vec<String>>, ()> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_str().map(str::to_owned).ok_or(()))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Some),
        Some(_) => Err(()),
    }
}

fn parse_headers(alias: &str, value: Option<&Value>) -> Option<HashMap<String, String>> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(
            map.iter()
                .filter_map(|(name, v)| match v {
                    Value::String(s) => Some((name.clone(), s.clone())),
                    other => {
                        warn!(
                            server = %alias,
                            header = %name,
                            kind = type_name(other),
                            "ignoring non-string header value"
                        );
                        None
                    }
                })
                .collect(),
        ),
        Some(other) => {
            warn!(
                server = %alias,
                kind = type_name(other),
                "invalid 'default_headers' format, expected an object; ignoring"
            );
            None
        }
    }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
