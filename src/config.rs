use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV_PREFIX: &str = "ARENA";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub endpoints: Endpoints,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub toast: ToastConfig,
    #[serde(default)]
    pub listing: ListingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Session cookie header sent with every request.
    #[serde(default)]
    pub cookie: String,
    #[serde(default = "default_csrf_cookie")]
    pub csrf_cookie: String,
    #[serde(default = "default_login_url")]
    pub login_url: String,
    #[serde(default = "default_auth_redirect_delay", with = "humantime_serde")]
    pub auth_redirect_delay: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
            cookie: String::new(),
            csrf_cookie: default_csrf_cookie(),
            login_url: default_login_url(),
            auth_redirect_delay: default_auth_redirect_delay(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000/".into()
}

fn default_user_agent() -> String {
    format!("arena-engage/{}", crate::VERSION)
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_csrf_cookie() -> String {
    crate::csrf::DEFAULT_COOKIE_NAME.into()
}

fn default_login_url() -> String {
    "/accounts/login/".into()
}

fn default_auth_redirect_delay() -> Duration {
    Duration::from_millis(700)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Endpoints {
    pub react: String,
    pub favorite: String,
    pub subscribe: String,
    pub rate: String,
    pub status: String,
    pub comment_add: String,
    pub comment_delete: String,
    pub comment_list: String,
    pub search: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            react: "/interactions/react/".into(),
            favorite: "/interactions/favorite/".into(),
            subscribe: "/interactions/subscribe/".into(),
            rate: "/interactions/rate/".into(),
            status: "/interactions/status/".into(),
            comment_add: "/comments/add/".into(),
            comment_delete: "/comments/delete/".into(),
            comment_list: "/comments/list/".into(),
            search: "/news/search/".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchConfig {
    #[serde(default = "default_debounce", with = "humantime_serde")]
    pub debounce: Duration,
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce: default_debounce(),
            min_chars: default_min_chars(),
            max_results: default_max_results(),
        }
    }
}

fn default_debounce() -> Duration {
    Duration::from_millis(300)
}

fn default_min_chars() -> usize {
    2
}

fn default_max_results() -> usize {
    8
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToastConfig {
    #[serde(default = "default_toast_ttl", with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for ToastConfig {
    fn default() -> Self {
        Self {
            ttl: default_toast_ttl(),
        }
    }
}

fn default_toast_ttl() -> Duration {
    crate::toast::DEFAULT_TTL
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingConfig {
    #[serde(default = "default_item_attr")]
    pub item_attr: String,
    #[serde(default = "default_next_attr")]
    pub next_attr: String,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            item_attr: default_item_attr(),
            next_attr: default_next_attr(),
        }
    }
}

fn default_item_attr() -> String {
    "data-card".into()
}

fn default_next_attr() -> String {
    "data-next-page".into()
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let path = options.config_file.or_else(default_config_path);
    let mut cfg = match path {
        Some(path) if path.exists() => read_config_file(&path)?,
        _ => Config::default(),
    };

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);
    sanitize(&mut cfg);

    url::Url::parse(&cfg.api.base_url).with_context(|| {
        format!("config: api.base_url {:?} is not a valid url", cfg.api.base_url)
    })?;

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn sanitize(cfg: &mut Config) {
    if cfg.search.min_chars == 0 {
        cfg.search.min_chars = default_min_chars();
    }
    if cfg.search.max_results == 0 {
        cfg.search.max_results = default_max_results();
    }
    if cfg.api.user_agent.trim().is_empty() {
        cfg.api.user_agent = default_user_agent();
    }
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    let upper_prefix = format!("{}_", prefix.to_uppercase());
    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            apply_env_value(cfg, &normalized, value);
        }
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "api.base_url" => cfg.api.base_url = value,
        "api.user_agent" => cfg.api.user_agent = value,
        "api.cookie" => cfg.api.cookie = value,
        "api.csrf_cookie" => cfg.api.csrf_cookie = value,
        "api.login_url" => cfg.api.login_url = value,
        "api.timeout" => set_duration(&mut cfg.api.timeout, &value),
        "api.auth_redirect_delay" => set_duration(&mut cfg.api.auth_redirect_delay, &value),
        "endpoints.react" => cfg.endpoints.react = value,
        "endpoints.favorite" => cfg.endpoints.favorite = value,
        "endpoints.subscribe" => cfg.endpoints.subscribe = value,
        "endpoints.rate" => cfg.endpoints.rate = value,
        "endpoints.status" => cfg.endpoints.status = value,
        "endpoints.comment_add" => cfg.endpoints.comment_add = value,
        "endpoints.comment_delete" => cfg.endpoints.comment_delete = value,
        "endpoints.comment_list" => cfg.endpoints.comment_list = value,
        "endpoints.search" => cfg.endpoints.search = value,
        "search.debounce" => set_duration(&mut cfg.search.debounce, &value),
        "search.min_chars" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.search.min_chars = parsed;
            }
        }
        "search.max_results" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.search.max_results = parsed;
            }
        }
        "toast.ttl" => set_duration(&mut cfg.toast.ttl, &value),
        "listing.item_attr" => cfg.listing.item_attr = value,
        "listing.next_attr" => cfg.listing.next_attr = value,
        _ => {}
    }
}

fn set_duration(slot: &mut Duration, value: &str) {
    if let Ok(duration) = humantime::parse_duration(value) {
        *slot = duration;
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("arena-engage").join("config.yaml"))
}
