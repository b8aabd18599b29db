//! `Set-Cookie` header rendering.

use crate::protocol::SendError;
use crate::utils::ensure;
use std::fmt;
use std::time::Duration;

/// The `SameSite` attribute of a cookie, `Lax` when not set explicitly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    #[default]
    Lax,
    None,
    Strict,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Lax => "Lax",
            SameSite::None => "None",
            SameSite::Strict => "Strict",
        }
    }
}

/// A cookie queued on a response.
///
/// A cookie without `max_age` is a session cookie and renders without `Max-Age`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: String,
    max_age: Option<Duration>,
    domain: Option<String>,
    path: Option<String>,
    same_site: SameSite,
    http_only: bool,
    secure: bool,
}

impl Cookie {
    pub fn new<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            max_age: None,
            domain: None,
            path: None,
            same_site: SameSite::default(),
            http_only: false,
            secure: false,
        }
    }

    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    #[must_use]
    pub fn with_domain<S: Into<String>>(mut self, domain: S) -> Self {
        self.domain = Some(domain.into());
        self
    }

    #[must_use]
    pub fn with_path<S: Into<String>>(mut self, path: S) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    #[must_use]
    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_session(&self) -> bool {
        self.max_age.is_none()
    }

    /// Checks that every part of the cookie can be written into a `Set-Cookie` line as is.
    ///
    /// The name must be a non empty token without `=`, the value and the `Domain` and
    /// `Path` attributes must not contain control characters or `;`.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::InvalidCookie`] naming the offending part.
    pub fn validate(&self) -> Result<(), SendError> {
        ensure!(
            !self.name.is_empty() && self.name.bytes().all(is_name_byte),
            SendError::invalid_cookie(format!("name `{}` is not a token", self.name.escape_debug()))
        );
        ensure!(
            self.value.bytes().all(is_attribute_byte),
            SendError::invalid_cookie(format!("value of `{}` contains a control character or `;`", self.name))
        );
        if let Some(domain) = &self.domain {
            ensure!(
                domain.bytes().all(is_attribute_byte),
                SendError::invalid_cookie(format!("domain of `{}` contains a control character or `;`", self.name))
            );
        }
        if let Some(path) = &self.path {
            ensure!(
                path.bytes().all(is_attribute_byte),
                SendError::invalid_cookie(format!("path of `{}` contains a control character or `;`", self.name))
            );
        }
        Ok(())
    }

    /// Writes the complete `Set-Cookie` header line, including its CRLF.
    ///
    /// `name` is the already cased header name, the attributes always come in the
    /// order `Max-Age`, `Domain`, `Path`, `SameSite`, `HttpOnly`, `Secure`.
    pub fn write_header<W: fmt::Write>(&self, name: &str, writer: &mut W) -> fmt::Result {
        write!(writer, "{name}: {}={}", self.name, self.value)?;
        if let Some(max_age) = self.max_age {
            write!(writer, "; Max-Age={}", max_age.as_secs())?;
        }
        if let Some(domain) = &self.domain {
            write!(writer, "; Domain={domain}")?;
        }
        if let Some(path) = &self.path {
            write!(writer, "; Path={path}")?;
        }
        write!(writer, "; SameSite={}", self.same_site.as_str())?;
        if self.http_only {
            writer.write_str("; HttpOnly")?;
        }
        if self.secure {
            writer.write_str("; Secure")?;
        }
        writer.write_str("\r\n")
    }
}

fn is_attribute_byte(byte: u8) -> bool {
    !byte.is_ascii_control() && byte != b';'
}

fn is_name_byte(byte: u8) -> bool {
    is_attribute_byte(byte) && byte.is_ascii_graphic() && !matches!(byte, b'=' | b',' | b'"' | b'\\')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(cookie: &Cookie) -> String {
        let mut line = String::new();
        cookie.write_header("Set-Cookie", &mut line).unwrap();
        line
    }

    #[test]
    fn test_full_cookie() {
        let cookie = Cookie::new("sid", "xyz")
            .with_max_age(Duration::from_secs(3600))
            .with_same_site(SameSite::Strict)
            .with_http_only(true);
        assert_eq!(render(&cookie), "Set-Cookie: sid=xyz; Max-Age=3600; SameSite=Strict; HttpOnly\r\n");
    }

    #[test]
    fn test_session_cookie_defaults_to_lax() {
        let cookie = Cookie::new("theme", "dark");
        assert!(cookie.is_session());
        assert_eq!(render(&cookie), "Set-Cookie: theme=dark; SameSite=Lax\r\n");
    }

    #[test]
    fn test_attribute_order() {
        let cookie = Cookie::new("a", "b")
            .with_secure(true)
            .with_path("/api")
            .with_http_only(true)
            .with_domain("example.com")
            .with_same_site(SameSite::None)
            .with_max_age(Duration::from_secs(60));
        assert_eq!(
            render(&cookie),
            "Set-Cookie: a=b; Max-Age=60; Domain=example.com; Path=/api; SameSite=None; HttpOnly; Secure\r\n"
        );
    }

    #[test]
    fn test_lower_case_header_name() {
        let mut line = String::new();
        Cookie::new("a", "b").write_header("set-cookie", &mut line).unwrap();
        assert_eq!(line, "set-cookie: a=b; SameSite=Lax\r\n");
    }

    #[test]
    fn test_valid_cookie() {
        let cookie = Cookie::new("sid", "a b=c").with_domain("example.com").with_path("/");
        assert!(cookie.validate().is_ok());
    }

    #[test]
    fn test_crlf_in_value_is_rejected() {
        let cookie = Cookie::new("sid", "x\r\nX-Injected: evil");
        assert!(matches!(cookie.validate(), Err(SendError::InvalidCookie { .. })));
    }

    #[test]
    fn test_invalid_names_are_rejected() {
        for name in ["", "a=b", "a;b", "a b", "a\nb", "caf\u{e9}"] {
            let result = Cookie::new(name, "v").validate();
            assert!(matches!(result, Err(SendError::InvalidCookie { .. })), "{name:?}");
        }
    }

    #[test]
    fn test_invalid_attributes_are_rejected() {
        assert!(Cookie::new("a", "b;Secure").validate().is_err());
        assert!(Cookie::new("a", "b").with_domain("x.com\r\n").validate().is_err());
        assert!(Cookie::new("a", "b").with_path("/; HttpOnly").validate().is_err());
        assert!(Cookie::new("a", "b\x7f").validate().is_err());
    }
}
