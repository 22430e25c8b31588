use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::error;

use foxy_shared::http::HttpError;

/// Cookie storage shared between the manager's caller and whatever else
/// needs it. The jar outlives the manager and the manager never touches
/// its contents; it only hands the reference back out via
/// [`crate::HttpManager::jar`].
#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: Mutex<HashMap<String, Vec<String>>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, host: &str, set_cookie: &str) -> Result<(), HttpError> {
        let mut cookies = self.lock()?;
        cookies
            .entry(host.to_string())
            .or_default()
            .push(set_cookie.to_string());
        Ok(())
    }

    pub fn cookies_for(&self, host: &str) -> Result<Vec<String>, HttpError> {
        Ok(self.lock()?.get(host).cloned().unwrap_or_default())
    }

    pub fn is_empty(&self) -> Result<bool, HttpError> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<String>>>, HttpError> {
        self.cookies.lock().map_err(|e| {
            error!("{e}");
            HttpError::Io(std::io::Error::other(format!("Lock cookie jar {e}")))
        })
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_per_host() {
        let jar = CookieJar::new();
        jar.store("a.test", "id=1").unwrap();
        jar.store("a.test", "theme=dark").unwrap();
        jar.store("b.test", "id=2").unwrap();

        assert_eq!(
            jar.cookies_for("a.test").unwrap(),
            vec!["id=1", "theme=dark"]
        );
        assert_eq!(jar.cookies_for("b.test").unwrap(), vec!["id=2"]);
        assert!(jar.cookies_for("c.test").unwrap().is_empty());
    }

    #[test]
    fn empty_jar() {
        let jar = CookieJar::new();
        assert!(jar.is_empty().unwrap());
        jar.store("a.test", "id=1").unwrap();
        assert!(!jar.is_empty().unwrap());
    }
}
