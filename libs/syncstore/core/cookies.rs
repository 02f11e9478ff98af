//! Cookie-backed storage
//!
//! A [`CookieJar`] is the environment's cookie string: reading returns the
//! `Cookie` request-header form (`a=1; b=2`), writing takes one `Set-Cookie`
//! line. [`CookieArea`] adapts a jar to [`StorageArea`], percent-encoding
//! values unless [`CookieOptions::encode`] is off. Removal writes the cookie
//! again with an expiry in the past.

use crate::error::{Result, StoreError};
use crate::traits::{StorageArea, StorageKind};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

const COOKIE_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// `Expires` value used to delete a cookie
pub const EXPIRED: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// Browsers cap `Max-Age` at 400 days
const MAX_AGE_CAP: i64 = 400 * 24 * 60 * 60;

/// A cookie string the store reads and writes
pub trait CookieJar: Send + Sync {
    /// Every live cookie as `name=value` pairs joined by `"; "`
    fn cookie_header(&self) -> String;

    /// Apply one `Set-Cookie` line
    fn set_cookie(&self, set_cookie: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SameSite::Strict => f.write_str("Strict"),
            SameSite::Lax => f.write_str("Lax"),
            SameSite::None => f.write_str("None"),
        }
    }
}

/// Attributes written with every cookie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieOptions {
    pub path: Option<String>,
    pub domain: Option<String>,
    /// Lifetime in seconds; wins over `expires`
    pub max_age: Option<i64>,
    pub expires: Option<DateTime<Utc>>,
    pub secure: bool,
    pub same_site: Option<SameSite>,
    /// Percent-encode values on write and decode them on read
    pub encode: bool,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: Some("/".to_string()),
            domain: None,
            max_age: None,
            expires: None,
            secure: false,
            same_site: None,
            encode: true,
        }
    }
}

impl CookieOptions {
    fn push_scope(&self, out: &mut String) {
        if let Some(path) = &self.path {
            out.push_str("; Path=");
            out.push_str(path);
        }
        if let Some(domain) = &self.domain {
            out.push_str("; Domain=");
            out.push_str(domain);
        }
    }

    /// `Set-Cookie` line storing `value` (already encoded) under `name`
    pub fn set_cookie(&self, name: &str, value: &str) -> String {
        let mut out = format!("{name}={value}");
        self.push_scope(&mut out);
        if let Some(max_age) = self.max_age {
            out.push_str(&format!("; Max-Age={max_age}"));
        }
        if let Some(expires) = self.expires {
            out.push_str(&format!("; Expires={}", expires.format(COOKIE_DATE_FORMAT)));
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if let Some(same_site) = self.same_site {
            out.push_str(&format!("; SameSite={same_site}"));
        }
        out
    }

    /// `Set-Cookie` line deleting `name` in this scope
    pub fn delete_cookie(&self, name: &str) -> String {
        let mut out = format!("{name}=");
        self.push_scope(&mut out);
        out.push_str("; Expires=");
        out.push_str(EXPIRED);
        out
    }
}

/// Split a `Cookie` header into raw `(name, value)` pairs, in order
///
/// Values are returned as written (not percent-decoded). Segments without a
/// name are skipped.
pub fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|segment| {
            let segment = segment.trim();
            let (name, value) = segment.split_once('=').unwrap_or((segment, ""));
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

fn parse_cookie_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw.trim(), COOKIE_DATE_FORMAT) {
        return Some(Utc.from_utc_datetime(&naive));
    }
    DateTime::parse_from_rfc2822(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[derive(Debug, Clone)]
struct StoredCookie {
    name: String,
    value: String,
    path: String,
    expires: Option<DateTime<Utc>>,
}

impl StoredCookie {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires.map_or(true, |at| at > now)
    }
}

/// In-process cookie jar honouring `Path`, `Max-Age` and `Expires`
///
/// Cookies are told apart by (name, path). `Domain`, `Secure` and `SameSite`
/// are accepted and ignored.
#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    cookies: Mutex<Vec<StoredCookie>>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jar pre-filled from a `Cookie` header, as a server sees it
    pub fn from_header(header: &str) -> Self {
        let cookies = parse_cookie_header(header)
            .into_iter()
            .map(|(name, value)| StoredCookie {
                name,
                value,
                path: "/".to_string(),
                expires: None,
            })
            .collect();
        Self {
            cookies: Mutex::new(cookies),
        }
    }

    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.cookies.lock().iter().filter(|c| c.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CookieJar for MemoryCookieJar {
    fn cookie_header(&self) -> String {
        let now = Utc::now();
        let mut cookies = self.cookies.lock();
        cookies.retain(|c| c.is_live(now));
        cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn set_cookie(&self, set_cookie: &str) -> Result<()> {
        let mut parts = set_cookie.split(';');
        let pair = parts.next().unwrap_or_default().trim();
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| StoreError::Storage(format!("malformed Set-Cookie: {set_cookie}")))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Storage(format!(
                "Set-Cookie without a name: {set_cookie}"
            )));
        }

        let now = Utc::now();
        let mut path = "/".to_string();
        let mut max_age: Option<i64> = None;
        let mut expires: Option<DateTime<Utc>> = None;
        for attribute in parts {
            let (attr, attr_value) = attribute.split_once('=').unwrap_or((attribute, ""));
            match attr.trim().to_ascii_lowercase().as_str() {
                "path" => path = attr_value.trim().to_string(),
                "max-age" => max_age = attr_value.trim().parse().ok(),
                "expires" => expires = parse_cookie_date(attr_value),
                _ => {}
            }
        }
        let expires = match max_age {
            Some(seconds) => Some(now + Duration::seconds(seconds.clamp(-1, MAX_AGE_CAP))),
            None => expires,
        };

        let mut cookies = self.cookies.lock();
        let existing = cookies.iter().position(|c| c.name == name && c.path == path);
        let cookie = StoredCookie {
            name: name.to_string(),
            value: value.trim().to_string(),
            path,
            expires,
        };

        if !cookie.is_live(now) {
            if let Some(index) = existing {
                cookies.remove(index);
            }
            debug!("[cookies] expired {}", cookie.name);
            return Ok(());
        }
        match existing {
            Some(index) => cookies[index] = cookie,
            None => cookies.push(cookie),
        }
        Ok(())
    }
}

/// [`StorageArea`] over a cookie jar
pub struct CookieArea<J: CookieJar> {
    jar: Arc<J>,
    options: CookieOptions,
}

impl<J: CookieJar> Clone for CookieArea<J> {
    fn clone(&self) -> Self {
        Self {
            jar: Arc::clone(&self.jar),
            options: self.options.clone(),
        }
    }
}

impl<J: CookieJar> fmt::Debug for CookieArea<J> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieArea")
            .field("options", &self.options)
            .finish()
    }
}

impl<J: CookieJar> CookieArea<J> {
    pub fn new(jar: Arc<J>, options: CookieOptions) -> Self {
        Self { jar, options }
    }

    pub fn jar(&self) -> &Arc<J> {
        &self.jar
    }

    pub fn options(&self) -> &CookieOptions {
        &self.options
    }

    fn decode(&self, raw: String) -> String {
        if !self.options.encode {
            return raw;
        }
        match urlencoding::decode(&raw) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => raw,
        }
    }
}

impl<J: CookieJar> StorageArea for CookieArea<J> {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let found = parse_cookie_header(&self.jar.cookie_header())
            .into_iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| self.decode(value));
        Ok(found)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let value = if self.options.encode {
            urlencoding::encode(value).into_owned()
        } else {
            value.to_string()
        };
        self.jar.set_cookie(&self.options.set_cookie(key, &value))
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.jar.set_cookie(&self.options.delete_cookie(key))
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(parse_cookie_header(&self.jar.cookie_header())
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    fn kind(&self) -> StorageKind {
        StorageKind::Cookie
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cookie_header() {
        let pairs = parse_cookie_header("a=1; b = two ;flag; =orphan; c=x=y");
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "two".to_string()),
                ("flag".to_string(), String::new()),
                ("c".to_string(), "x=y".to_string()),
            ]
        );
        assert!(parse_cookie_header("").is_empty());
    }

    #[test]
    fn test_set_cookie_line_carries_options() {
        let options = CookieOptions {
            domain: Some("example.com".into()),
            max_age: Some(60),
            secure: true,
            same_site: Some(SameSite::Lax),
            ..CookieOptions::default()
        };
        assert_eq!(
            options.set_cookie("token", "abc"),
            "token=abc; Path=/; Domain=example.com; Max-Age=60; Secure; SameSite=Lax"
        );
        assert_eq!(
            options.delete_cookie("token"),
            "token=; Path=/; Domain=example.com; Expires=Thu, 01 Jan 1970 00:00:00 GMT"
        );
    }

    #[test]
    fn test_jar_expiry_rules() {
        let jar = MemoryCookieJar::new();
        jar.set_cookie("a=1; Path=/").unwrap();
        jar.set_cookie("b=2; Max-Age=3600").unwrap();
        jar.set_cookie("c=3; Expires=Wed, 01 Jan 2200 00:00:00 GMT").unwrap();
        assert_eq!(jar.cookie_header(), "a=1; b=2; c=3");

        jar.set_cookie("b=; Max-Age=0").unwrap();
        jar.set_cookie(&format!("c=; Expires={EXPIRED}")).unwrap();
        assert_eq!(jar.cookie_header(), "a=1");
    }

    #[test]
    fn test_jar_keys_by_name_and_path() {
        let jar = MemoryCookieJar::new();
        jar.set_cookie("id=root; Path=/").unwrap();
        jar.set_cookie("id=admin; Path=/admin").unwrap();
        jar.set_cookie("id=root2; Path=/").unwrap();
        assert_eq!(jar.cookie_header(), "id=root2; id=admin");
        assert!(jar.set_cookie("no-equals-sign").is_err());
    }

    #[test]
    fn test_area_encodes_values() {
        let jar = Arc::new(MemoryCookieJar::new());
        let area = CookieArea::new(Arc::clone(&jar), CookieOptions::default());
        area.set_item("greeting", "hello world; ok").unwrap();

        assert_eq!(jar.cookie_header(), "greeting=hello%20world%3B%20ok");
        assert_eq!(
            area.get_item("greeting").unwrap().as_deref(),
            Some("hello world; ok")
        );

        area.remove_item("greeting").unwrap();
        assert_eq!(area.get_item("greeting").unwrap(), None);
        assert!(jar.is_empty());
    }

    #[test]
    fn test_area_without_encoding_stores_raw() {
        let jar = Arc::new(MemoryCookieJar::new());
        let options = CookieOptions {
            encode: false,
            ..CookieOptions::default()
        };
        let area = CookieArea::new(Arc::clone(&jar), options);
        area.set_item("raw", "a%20b").unwrap();
        assert_eq!(area.get_item("raw").unwrap().as_deref(), Some("a%20b"));
        assert_eq!(area.keys().unwrap(), vec!["raw"]);
    }

    #[test]
    fn test_jar_from_server_header() {
        let jar = MemoryCookieJar::from_header("theme=dark; lang=en");
        assert_eq!(jar.len(), 2);
        assert_eq!(jar.cookie_header(), "theme=dark; lang=en");
    }
}
