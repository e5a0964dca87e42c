//! Location API
//!
//! Tracks the current document URL and forwards in-place navigations to
//! the host display surface. Installs `location`, `window` and
//! `window.open` into the script environment.

use crate::environment::host_namespace;
use crate::HostError;
use rquickjs::{Ctx, Exception, Function};
use std::cell::RefCell;
use std::rc::Rc;
use url::Url;

/// Whatever renders the document. Navigation replaces the current document
/// in place; no new browsing context is ever opened.
pub trait DisplaySurface {
    fn replace(&mut self, url: &Url);
}

impl<F: FnMut(&Url)> DisplaySurface for F {
    fn replace(&mut self, url: &Url) {
        self(url)
    }
}

/// Default surface: there is no document to swap, so the request is logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSurface;

impl DisplaySurface for LoggingSurface {
    fn replace(&mut self, url: &Url) {
        tracing::info!(url = %url, "navigating in place");
    }
}

/// Location state
pub struct LocationManager {
    url: Url,
    surface: Box<dyn DisplaySurface>,
}

impl std::fmt::Debug for LocationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationManager").field("url", &self.url.as_str()).finish_non_exhaustive()
    }
}

impl LocationManager {
    pub fn new(url: &str) -> Result<Self, HostError> {
        Ok(Self {
            url: Url::parse(url)?,
            surface: Box::new(LoggingSurface),
        })
    }

    /// Swap the display surface, returning the previous one.
    pub fn set_surface(&mut self, surface: Box<dyn DisplaySurface>) -> Box<dyn DisplaySurface> {
        std::mem::replace(&mut self.surface, surface)
    }

    /// Resolve `target` against the current URL, hand it to the surface and
    /// make it current.
    pub fn navigate(&mut self, target: &str) -> Result<Url, HostError> {
        let url = self.url.join(target.trim())?;
        tracing::debug!(from = %self.url, to = %url, "replace location");
        self.surface.replace(&url);
        self.url = url.clone();
        Ok(url)
    }

    /// Full URL
    pub fn href(&self) -> &str {
        self.url.as_str()
    }

    /// Protocol (e.g., "https:")
    pub fn protocol(&self) -> String {
        format!("{}:", self.url.scheme())
    }

    /// Host (hostname:port)
    pub fn host(&self) -> String {
        match (self.url.host_str(), self.url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            _ => String::new(),
        }
    }

    /// Hostname only
    pub fn hostname(&self) -> &str {
        self.url.host_str().unwrap_or("")
    }

    /// Port
    pub fn port(&self) -> String {
        self.url.port().map(|p| p.to_string()).unwrap_or_default()
    }

    /// Pathname
    pub fn pathname(&self) -> &str {
        self.url.path()
    }

    /// Search/query string (including ?)
    pub fn search(&self) -> String {
        match self.url.query() {
            Some(q) if !q.is_empty() => format!("?{q}"),
            _ => String::new(),
        }
    }

    /// Hash/fragment (including #)
    pub fn hash(&self) -> String {
        match self.url.fragment() {
            Some(f) if !f.is_empty() => format!("#{f}"),
            _ => String::new(),
        }
    }

    /// Origin
    pub fn origin(&self) -> String {
        self.url.origin().ascii_serialization()
    }

    fn part(&self, name: &str) -> String {
        match name {
            "href" => self.href().to_string(),
            "protocol" => self.protocol(),
            "host" => self.host(),
            "hostname" => self.hostname().to_string(),
            "port" => self.port(),
            "pathname" => self.pathname().to_string(),
            "search" => self.search(),
            "hash" => self.hash(),
            "origin" => self.origin(),
            _ => String::new(),
        }
    }
}

const LOCATION_BOOTSTRAP: &str = r#"
(() => {
    const host = globalThis.__embridge;
    const location = {};
    const getter = (name) => () => host.locationPart(name);

    for (const name of ['protocol', 'host', 'hostname', 'port', 'pathname', 'search', 'hash', 'origin']) {
        Object.defineProperty(location, name, { get: getter(name), enumerable: true });
    }
    Object.defineProperty(location, 'href', {
        get: getter('href'),
        set: (url) => host.navigate(String(url)),
        enumerable: true,
    });
    location.assign = (url) => host.navigate(String(url));
    location.replace = (url) => host.navigate(String(url));
    location.reload = () => host.navigate(host.locationPart('href'));
    location.toString = () => host.locationPart('href');

    globalThis.window = globalThis;
    globalThis.self = globalThis;
    globalThis.location = location;
    globalThis.open = (url, target) => {
        if (target === '_self') {
            host.navigate(String(url));
            return globalThis;
        }
        console.warn(`window.open: target ${String(target)} is not supported, only _self`);
        return null;
    };
})();
"#;

/// Install location API into global
pub fn install_location(ctx: &Ctx<'_>, location: Rc<RefCell<LocationManager>>) -> rquickjs::Result<()> {
    let host = host_namespace(ctx)?;

    let l = location.clone();
    host.set(
        "locationPart",
        Function::new(ctx.clone(), move |name: String| -> rquickjs::Result<String> {
            Ok(l.borrow().part(&name))
        })?,
    )?;

    let l = location;
    host.set(
        "navigate",
        Function::new(ctx.clone(), move |ctx: Ctx<'_>, url: String| -> rquickjs::Result<()> {
            match l.borrow_mut().navigate(&url) {
                Ok(_) => Ok(()),
                Err(err) => Err(Exception::throw_type(&ctx, &format!("cannot navigate to {url:?}: {err}"))),
            }
        })?,
    )?;

    ctx.eval::<(), _>(LOCATION_BOOTSTRAP)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_parts() {
        let loc = LocationManager::new("https://example.com:8080/path/to/page?query=1#section").unwrap();

        assert_eq!(loc.protocol(), "https:");
        assert_eq!(loc.host(), "example.com:8080");
        assert_eq!(loc.hostname(), "example.com");
        assert_eq!(loc.port(), "8080");
        assert_eq!(loc.pathname(), "/path/to/page");
        assert_eq!(loc.search(), "?query=1");
        assert_eq!(loc.hash(), "#section");
        assert_eq!(loc.origin(), "https://example.com:8080");
    }

    #[test]
    fn test_location_default_port_hidden() {
        let loc = LocationManager::new("https://example.com/").unwrap();

        assert_eq!(loc.host(), "example.com");
        assert_eq!(loc.port(), "");
        assert_eq!(loc.search(), "");
        assert_eq!(loc.hash(), "");
    }

    #[test]
    fn test_navigate_reaches_surface() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let mut loc = LocationManager::new("https://example.com/").unwrap();
        loc.set_surface(Box::new(move |url: &Url| sink.borrow_mut().push(url.to_string())));

        loc.navigate("https://other.com/page").unwrap();

        assert_eq!(loc.hostname(), "other.com");
        assert_eq!(loc.pathname(), "/page");
        assert_eq!(*seen.borrow(), vec!["https://other.com/page".to_string()]);
    }

    #[test]
    fn test_navigate_relative() {
        let mut loc = LocationManager::new("https://example.com/app/index.html").unwrap();
        let url = loc.navigate("next.html?step=2").unwrap();
        assert_eq!(url.as_str(), "https://example.com/app/next.html?step=2");
    }

    #[test]
    fn test_navigate_relative_from_blank_fails() {
        let mut loc = LocationManager::new("about:blank").unwrap();
        assert!(matches!(loc.navigate("page.html"), Err(HostError::InvalidUrl(_))));
        assert_eq!(loc.href(), "about:blank");
    }
}
