use cookie::time::{Duration, OffsetDateTime};
use cookie::Cookie;
use http::header::{HeaderMap, HeaderValue, InvalidHeaderValue, COOKIE, SET_COOKIE};
use serde::{Deserialize, Serialize};

use super::CookieOptions;

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl From<SameSite> for cookie::SameSite {
    fn from(value: SameSite) -> Self {
        match value {
            SameSite::Strict => cookie::SameSite::Strict,
            SameSite::Lax => cookie::SameSite::Lax,
            SameSite::None => cookie::SameSite::None,
        }
    }
}

/// Find the value of cookie `name` across all `Cookie` request headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| Cookie::split_parse(s))
        .filter_map(Result::ok)
        .find(|c| c.name() == name)
        .map(|c| c.value().to_string())
}

/// Build a cookie carrying `value` with the given options.
pub fn new_cookie(name: &str, value: &str, options: &CookieOptions) -> Cookie<'static> {
    let mut builder = Cookie::build((name.to_string(), value.to_string()))
        .path(options.path.clone())
        .secure(options.secure)
        .http_only(options.http_only);

    if let Some(domain) = &options.domain {
        builder = builder.domain(domain.clone());
    }
    if let Some(same_site) = options.same_site {
        builder = builder.same_site(same_site.into());
    }

    match options.max_age {
        age if age > 0 => {
            let ttl = Duration::seconds(age);
            builder = builder.max_age(ttl);
            // Past the representable date range only Max-Age is sent
            if let Some(expires) = OffsetDateTime::now_utc().checked_add(ttl) {
                builder = builder.expires(expires);
            }
        }
        age if age < 0 => {
            builder = builder
                .max_age(Duration::ZERO)
                .expires(OffsetDateTime::UNIX_EPOCH + Duration::seconds(1));
        }
        _ => {}
    }

    builder.build()
}

/// Append a `Set-Cookie` header.
pub fn set_cookie(headers: &mut HeaderMap, cookie: &Cookie<'_>) -> Result<(), InvalidHeaderValue> {
    let value = HeaderValue::from_str(&cookie.to_string())?;
    headers.append(SET_COOKIE, value);
    Ok(())
}
