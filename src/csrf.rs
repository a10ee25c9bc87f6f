use parking_lot::RwLock;
use percent_encoding::percent_decode_str;

pub const DEFAULT_COOKIE_NAME: &str = "csrftoken";

pub trait CsrfSource: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// Fixed token, used when the token is known up front.
#[derive(Debug, Clone)]
pub struct StaticCsrf(String);

impl StaticCsrf {
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self(token.into())
    }
}

impl CsrfSource for StaticCsrf {
    fn token(&self) -> Option<String> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.clone())
        }
    }
}

/// Reads the token out of a `Cookie` header string on every call.
pub struct CookieCsrf {
    cookie_name: String,
    cookies: RwLock<String>,
}

impl CookieCsrf {
    pub fn new<N: Into<String>, C: Into<String>>(cookie_name: N, cookies: C) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            cookies: RwLock::new(cookies.into()),
        }
    }

    pub fn set_cookies<C: Into<String>>(&self, cookies: C) {
        *self.cookies.write() = cookies.into();
    }
}

impl CsrfSource for CookieCsrf {
    fn token(&self) -> Option<String> {
        cookie_value(&self.cookies.read(), &self.cookie_name)
    }
}

pub fn cookie_value(header: &str, name: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| {
            let value = value.trim().trim_matches('"');
            percent_decode_str(value).decode_utf8_lossy().into_owned()
        })
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_token_among_cookies() {
        let header = "sessionid=abc; csrftoken=tok%2B1; theme=dark";
        assert_eq!(cookie_value(header, "csrftoken").as_deref(), Some("tok+1"));
        assert_eq!(cookie_value(header, "missing"), None);
    }

    #[test]
    fn cookie_source_tracks_updates() {
        let source = CookieCsrf::new(DEFAULT_COOKIE_NAME, "");
        assert_eq!(source.token(), None);
        source.set_cookies("csrftoken=fresh");
        assert_eq!(source.token().as_deref(), Some("fresh"));
    }

    #[test]
    fn empty_static_token_is_absent() {
        assert_eq!(StaticCsrf::new("").token(), None);
        assert_eq!(StaticCsrf::new("x").token().as_deref(), Some("x"));
    }
}
