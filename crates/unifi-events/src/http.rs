// Authenticated REST verbs against the controller.
//
// Every call first makes sure the session is alive (one implicit re-login
// at most), then sends the request with the CSRF token and session cookie.
// Response bodies come back as raw JSON; the `{ meta, data }` envelope is
// left to the caller.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::client::UnifiEvents;
use crate::config::ControllerConfig;
use crate::error::Error;

/// Resolve a caller path against the controller layout.
///
/// A rooted path (`/api/self`) only gets the generation's proxy prefix
/// inserted; anything else (`stat/device`) is relative to the site API root.
pub fn resource_path(config: &ControllerConfig, path: &str) -> String {
    if path.starts_with('/') {
        format!("{}{path}", config.generation.proxy_prefix())
    } else {
        format!("{}{path}", config.site_prefix())
    }
}

impl UnifiEvents {
    /// Full URL for `path`; see [`resource_path`].
    pub fn resource_url(&self, path: &str) -> Result<Url, Error> {
        let relative = resource_path(self.config(), path);
        Ok(self.session().base_url().join(&relative)?)
    }

    pub async fn get(&self, path: &str) -> Result<Value, Error> {
        let url = self.prepare(path).await?;
        debug!("GET {}", url);
        self.execute(self.session().http().get(url)).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value, Error> {
        let url = self.prepare(path).await?;
        debug!("POST {}", url);
        self.execute(self.session().http().post(url).json(body)).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value, Error> {
        let url = self.prepare(path).await?;
        debug!("PUT {}", url);
        self.execute(self.session().http().put(url).json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, Error> {
        let url = self.prepare(path).await?;
        debug!("DELETE {}", url);
        self.execute(self.session().http().delete(url)).await
    }

    async fn prepare(&self, path: &str) -> Result<Url, Error> {
        self.ensure_logged_in().await;
        self.resource_url(path)
    }

    /// Send with the CSRF token attached and decode the body.
    ///
    /// Non-2xx statuses keep the body verbatim in `Error::Request`; an empty
    /// success body is `Value::Null`.
    async fn execute(&self, builder: reqwest::RequestBuilder) -> Result<Value, Error> {
        let session = self.session();
        let resp = session.apply_csrf(builder).send().await?;
        session.update_csrf_from_response(resp.headers());

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(Error::Request {
                status: status.as_u16(),
                body,
            });
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::Generation;

    #[test]
    fn relative_paths_are_site_scoped() {
        let classic = ControllerConfig::default();
        assert_eq!(resource_path(&classic, "stat/device"), "/api/s/default/stat/device");

        let os = ControllerConfig::default()
            .with_generation(Generation::UnifiOs)
            .with_site("branch");
        assert_eq!(
            resource_path(&os, "rest/user"),
            "/proxy/network/api/s/branch/rest/user"
        );
    }

    #[test]
    fn rooted_paths_only_get_the_proxy_prefix() {
        let classic = ControllerConfig::default();
        assert_eq!(resource_path(&classic, "/api/self/sites"), "/api/self/sites");

        let os = ControllerConfig::default().with_generation(Generation::UnifiOs);
        assert_eq!(
            resource_path(&os, "/api/self/sites"),
            "/proxy/network/api/self/sites"
        );
    }

    #[test]
    fn resource_url_joins_the_controller_root() {
        let client = UnifiEvents::new(ControllerConfig::new("10.0.0.1", 8443)).unwrap();
        assert_eq!(
            client.resource_url("stat/health").unwrap().as_str(),
            "https://10.0.0.1:8443/api/s/default/stat/health"
        );
    }
}
