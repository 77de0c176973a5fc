#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    env, fs, io,
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_WWW_ROOT: &str = "www";
pub const DEFAULT_YTDLP_BIN: &str = "yt-dlp";

/// Fully resolved runtime settings for the proxy server.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: IpAddr,
    pub port: u16,
    pub www_root: PathBuf,
    pub ytdlp_bin: PathBuf,
    pub cookies: Option<PathBuf>,
}

impl Settings {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Values given on the command line. They win over the process environment,
/// which in turn wins over the `.env` file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub www_root: Option<PathBuf>,
    pub ytdlp_bin: Option<PathBuf>,
    pub cookies: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_settings(overrides: Overrides) -> Result<Settings> {
    let env_path = overrides
        .env_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(&env_path)?;
    build_settings(&file_vars, env_var_string, overrides)
}

fn build_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: Overrides,
) -> Result<Settings> {
    let lookup = |key: &str| env_lookup(key).or_else(|| file_vars.get(key).cloned());

    let host_raw = non_blank(overrides.host)
        .or_else(|| lookup("YTPROXY_HOST"))
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let host = parse_host(host_raw.trim())?;
    let port = overrides
        .port
        .or_else(|| {
            lookup("YTPROXY_PORT")
                .and_then(|value| value.trim().parse::<u16>().ok())
        })
        .unwrap_or(DEFAULT_PORT);
    let www_root = overrides
        .www_root
        .or_else(|| lookup("WWW_ROOT").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_WWW_ROOT));
    let ytdlp_bin = overrides
        .ytdlp_bin
        .or_else(|| lookup("YTDLP_BIN").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_YTDLP_BIN));
    let cookies = overrides
        .cookies
        .or_else(|| lookup("YTDLP_COOKIES").map(PathBuf::from));

    Ok(Settings {
        host,
        port,
        www_root,
        ytdlp_bin,
        cookies,
    })
}

pub fn parse_host(value: &str) -> Result<IpAddr> {
    value
        .parse::<IpAddr>()
        .with_context(|| format!("expected a valid IPv4 or IPv6 address, got {value:?}"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn env_var_string(key: &str) -> Option<String> {
    non_blank(env::var(key).ok())
}

/// Parses a dotenv-style file. A missing file yields an empty map.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(err) => return Err(err).with_context(|| format!("reading {}", path.display())),
    };
    Ok(content
        .lines()
        .filter_map(parse_env_line)
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect())
}

/// Splits `[export ]KEY=VALUE`. Blank lines, comments and lines without a
/// key yield `None`.
fn parse_env_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, unquote(value.trim())))
}

/// Drops one pair of matching surrounding quotes.
fn unquote(value: &str) -> &str {
    ['"', '\'']
        .into_iter()
        .find_map(|quote| value.strip_prefix(quote)?.strip_suffix(quote))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn make_env_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    fn settings_from(contents: &str) -> Settings {
        let file = make_env_file(contents);
        let vars = read_env_file(file.path()).unwrap();
        build_settings(&vars, |_| None, Overrides::default()).unwrap()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let settings = build_settings(&HashMap::new(), |_| None, Overrides::default()).unwrap();
        assert_eq!(settings.port, DEFAULT_PORT);
        assert_eq!(settings.host, DEFAULT_HOST.parse::<IpAddr>().unwrap());
        assert_eq!(settings.www_root, PathBuf::from(DEFAULT_WWW_ROOT));
        assert_eq!(settings.ytdlp_bin, PathBuf::from(DEFAULT_YTDLP_BIN));
        assert!(settings.cookies.is_none());
    }

    #[test]
    fn env_file_values_are_used() {
        let settings = settings_from(
            "YTPROXY_PORT=\"4242\"\nYTPROXY_HOST=\"127.0.0.1\"\nWWW_ROOT=\"/srv/www\"\nYTDLP_COOKIES=\"/tmp/c.txt\"\n",
        );
        assert_eq!(settings.port, 4242);
        assert_eq!(settings.host, "127.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(settings.www_root, PathBuf::from("/srv/www"));
        assert_eq!(settings.cookies, Some(PathBuf::from("/tmp/c.txt")));
    }

    #[test]
    fn invalid_port_in_file_falls_back_to_default() {
        let settings = settings_from("YTPROXY_PORT=\"nope\"\n");
        assert_eq!(settings.port, DEFAULT_PORT);
    }

    #[test]
    fn invalid_host_is_an_error() {
        let vars = read_env_file(make_env_file("YTPROXY_HOST=\"not-an-ip\"\n").path()).unwrap();
        let err = build_settings(&vars, |_| None, Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("not-an-ip"));
    }

    #[test]
    fn env_wins_over_file() {
        let vars = read_env_file(make_env_file("YTDLP_BIN=\"/file/yt-dlp\"\n").path()).unwrap();
        let settings = build_settings(
            &vars,
            |key| (key == "YTDLP_BIN").then(|| "/env/yt-dlp".to_string()),
            Overrides::default(),
        )
        .unwrap();
        assert_eq!(settings.ytdlp_bin, PathBuf::from("/env/yt-dlp"));
    }

    #[test]
    fn overrides_win_over_env_and_file() {
        let mut vars = HashMap::new();
        vars.insert("YTPROXY_PORT".to_string(), "7000".to_string());
        vars.insert("YTPROXY_HOST".to_string(), "10.0.0.1".to_string());
        vars.insert("WWW_ROOT".to_string(), "/file-www".to_string());

        let settings = build_settings(
            &vars,
            |key| match key {
                "YTPROXY_PORT" => Some("8001".to_string()),
                "WWW_ROOT" => Some("/env-www".to_string()),
                _ => None,
            },
            Overrides {
                port: Some(9000),
                host: Some("::1".into()),
                ..Overrides::default()
            },
        )
        .unwrap();

        assert_eq!(settings.port, 9000);
        assert_eq!(settings.host, "::1".parse::<IpAddr>().unwrap());
        assert_eq!(settings.www_root, PathBuf::from("/env-www"));
        assert_eq!(settings.socket_addr().port(), 9000);
    }

    #[test]
    fn blank_host_override_is_ignored() {
        let settings = build_settings(
            &HashMap::new(),
            |_| None,
            Overrides {
                host: Some("   ".into()),
                ..Overrides::default()
            },
        )
        .unwrap();
        assert_eq!(settings.host, DEFAULT_HOST.parse::<IpAddr>().unwrap());
    }

    #[test]
    fn read_env_file_handles_export_and_quotes() {
        let file = make_env_file(
            r#"
            export YTPROXY_HOST="127.0.0.1"
            WWW_ROOT='/www'
            YTPROXY_PORT =  "9090"
            # comment
            INVALID_LINE
            "#,
        );
        let vars = read_env_file(file.path()).unwrap();
        assert_eq!(vars.get("YTPROXY_HOST").unwrap(), "127.0.0.1");
        assert_eq!(vars.get("WWW_ROOT").unwrap(), "/www");
        assert_eq!(vars.get("YTPROXY_PORT").unwrap(), "9090");
        assert!(!vars.contains_key("INVALID_LINE"));
    }

    #[test]
    fn parse_env_line_strips_only_matching_quotes() {
        assert_eq!(parse_env_line("KEY=\"it's\""), Some(("KEY", "it's")));
        assert_eq!(parse_env_line("KEY='\"quoted\"'"), Some(("KEY", "\"quoted\"")));
        assert_eq!(parse_env_line("KEY=\"unbalanced'"), Some(("KEY", "\"unbalanced'")));
        assert_eq!(parse_env_line("KEY="), Some(("KEY", "")));
        assert_eq!(parse_env_line("  # KEY=value"), None);
        assert_eq!(parse_env_line("=value"), None);
        assert_eq!(parse_env_line(""), None);
    }

    #[test]
    fn read_env_file_missing_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let vars = read_env_file(&dir.path().join("missing.env")).unwrap();
        assert!(vars.is_empty());
    }
}
