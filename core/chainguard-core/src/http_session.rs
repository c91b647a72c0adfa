//! HTTP sessions for endpoint testing, with CSRF-aware login and silent
//! re-login.
//!
//! One session per project, held in a TTL-LRU so idle sessions age out.
//! Redirects are never followed automatically — a 3xx to a login page is an
//! auth signal the probe must see, not transparently chase.

use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::redirect::Policy;
use reqwest::Method;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::cache::TtlLruCache;
use crate::config::{HTTP_SESSION_CAP, HTTP_SESSION_TTL};
use crate::error::{ChainguardError, Result};

/// Field names commonly carrying a CSRF token in login forms.
const CSRF_FIELD_NAMES: &[&str] = &[
    "_token",
    "csrf_token",
    "authenticity_token",
    "_csrf",
    "csrfmiddlewaretoken",
    "__RequestVerificationToken",
];

static META_CSRF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<meta\s+name=["']csrf-token["']\s+content=["']([^"']+)["']"#).unwrap()
});

#[derive(Debug, Clone)]
pub struct LoginCredentials {
    pub login_url: String,
    pub username: String,
    pub password: String,
    pub username_field: String,
    pub password_field: String,
}

pub struct HttpSession {
    client: reqwest::Client,
    pub base_url: String,
    pub csrf_token: Option<String>,
    pub logged_in: bool,
    pub credentials: Option<LoginCredentials>,
    pub last_used: Instant,
}

#[derive(Debug, Clone)]
pub struct EndpointProbe {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub auth_required: bool,
    pub redirected_to: Option<String>,
    pub body_snippet: String,
    pub duration_ms: u128,
    pub relogin_attempted: bool,
}

/// True when a response looks like it hit an auth wall: hard status codes,
/// a redirect toward a login page, or a 200 that is itself a login form.
pub fn looks_unauthenticated(status: u16, location: Option<&str>, body: &str) -> bool {
    if status == 401 || status == 403 {
        return true;
    }
    if (300..400).contains(&status) {
        if let Some(target) = location {
            if target.to_ascii_lowercase().contains("login") {
                return true;
            }
        }
    }
    if status == 200 {
        let lower = body.to_ascii_lowercase();
        if lower.contains("login") && lower.contains("form") {
            return true;
        }
    }
    false
}

/// Extract a CSRF field name and value from a login page.
pub fn extract_csrf(html: &str) -> Option<(String, String)> {
    for field in CSRF_FIELD_NAMES {
        // name before value and value before name both occur in the wild.
        let name_first = Regex::new(&format!(
            r#"name=["']{}["'][^>]*value=["']([^"']*)["']"#,
            regex::escape(field)
        ))
        .ok()?;
        if let Some(caps) = name_first.captures(html) {
            return Some((field.to_string(), caps[1].to_string()));
        }

        let value_first = Regex::new(&format!(
            r#"value=["']([^"']*)["'][^>]*name=["']{}["']"#,
            regex::escape(field)
        ))
        .ok()?;
        if let Some(caps) = value_first.captures(html) {
            return Some((field.to_string(), caps[1].to_string()));
        }
    }

    META_CSRF
        .captures(html)
        .map(|caps| ("_token".to_string(), caps[1].to_string()))
}

/// Join a path onto the session base URL; absolute URLs pass through.
pub fn resolve_url(base_url: &str, url: &str) -> Result<String> {
    if url.starts_with("http://") || url.starts_with("https://") {
        return Ok(url.to_string());
    }
    if base_url.is_empty() {
        return Err(ChainguardError::InvalidInput(
            "relative URL given but no base URL is set (use set_base_url)".to_string(),
        ));
    }
    Ok(format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        url.trim_start_matches('/')
    ))
}

impl HttpSession {
    fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(Policy::none())
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| ChainguardError::Http(format!("client build failed: {}", e)))?;
        Ok(Self {
            client,
            base_url: String::new(),
            csrf_token: None,
            logged_in: false,
            credentials: None,
            last_used: Instant::now(),
        })
    }

    /// GET the login page, extract CSRF, POST the form, judge the outcome.
    pub async fn login(&mut self, credentials: LoginCredentials) -> Result<String> {
        let page = self
            .client
            .get(&credentials.login_url)
            .send()
            .await
            .map_err(|e| ChainguardError::Http(format!("login page fetch failed: {}", e)))?;
        let html = page.text().await.unwrap_or_default();

        let csrf = extract_csrf(&html);
        let mut form: Vec<(String, String)> = vec![
            (
                credentials.username_field.clone(),
                credentials.username.clone(),
            ),
            (
                credentials.password_field.clone(),
                credentials.password.clone(),
            ),
        ];
        if let Some((field, value)) = &csrf {
            form.push((field.clone(), value.clone()));
            self.csrf_token = Some(value.clone());
        }

        let response = self
            .client
            .post(&credentials.login_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| ChainguardError::Http(format!("login POST failed: {}", e)))?;

        let status = response.status().as_u16();
        let location = header_string(&response, "location");
        let body = response.text().await.unwrap_or_default();

        if status >= 400 || looks_unauthenticated(status, location.as_deref(), &body) {
            self.logged_in = false;
            return Err(ChainguardError::AuthRequired(format!(
                "login did not stick (status {})",
                status
            )));
        }

        self.logged_in = true;
        self.credentials = Some(credentials);
        self.last_used = Instant::now();
        Ok(format!(
            "logged in (status {}{})",
            status,
            if csrf.is_some() { ", CSRF token sent" } else { "" }
        ))
    }

    /// Probe an endpoint with the current session. When the session believed
    /// itself logged in but the probe hits an auth wall, re-login silently
    /// from stored credentials and retry once.
    pub async fn test_endpoint(
        &mut self,
        method: &str,
        url: &str,
        data: Option<&Value>,
        headers: &[(String, String)],
    ) -> Result<EndpointProbe> {
        let resolved = resolve_url(&self.base_url, url)?;
        let mut probe = self.send_probe(method, &resolved, data, headers).await?;

        if probe.auth_required && self.logged_in {
            if let Some(credentials) = self.credentials.clone() {
                match self.login(credentials).await {
                    Ok(_) => {
                        probe = self.send_probe(method, &resolved, data, headers).await?;
                        probe.relogin_attempted = true;
                    }
                    Err(_) => {
                        self.logged_in = false;
                        probe.relogin_attempted = true;
                    }
                }
            }
        }

        self.last_used = Instant::now();
        Ok(probe)
    }

    async fn send_probe(
        &self,
        method: &str,
        url: &str,
        data: Option<&Value>,
        headers: &[(String, String)],
    ) -> Result<EndpointProbe> {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| ChainguardError::InvalidInput(format!("bad HTTP method: {}", method)))?;

        let started = Instant::now();
        let mut request = self.client.request(method.clone(), url);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if let Some(data) = data {
            request = request.json(data);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ChainguardError::Http(format!("{} {} failed: {}", method, url, e)))?;

        let status = response.status().as_u16();
        let location = header_string(&response, "location");
        let body = response.text().await.unwrap_or_default();
        let auth_required = looks_unauthenticated(status, location.as_deref(), &body);

        Ok(EndpointProbe {
            method: method.to_string(),
            url: url.to_string(),
            status,
            auth_required,
            redirected_to: location,
            body_snippet: body.chars().take(300).collect(),
            duration_ms: started.elapsed().as_millis(),
            relogin_attempted: false,
        })
    }
}

fn header_string(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// TTL-LRU of per-project sessions.
pub struct HttpSessionManager {
    sessions: Mutex<TtlLruCache<String, Arc<Mutex<HttpSession>>>>,
}

impl Default for HttpSessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpSessionManager {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(TtlLruCache::new(HTTP_SESSION_CAP, HTTP_SESSION_TTL)),
        }
    }

    /// Get or create the session for a project.
    pub async fn session(&self, project_id: &str) -> Result<Arc<Mutex<HttpSession>>> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(&project_id.to_string()) {
            return Ok(Arc::clone(session));
        }
        let session = Arc::new(Mutex::new(HttpSession::new()?));
        sessions.insert(project_id.to_string(), Arc::clone(&session));
        Ok(session)
    }

    pub async fn clear(&self, project_id: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(&project_id.to_string()).is_some()
    }
}

/// One-shot reachability probe for health checks; no session, no cookies.
pub async fn health_probe(url: &str) -> (Option<u16>, u128, Option<String>) {
    let started = Instant::now();
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
    {
        Ok(client) => client,
        Err(err) => return (None, 0, Some(err.to_string())),
    };
    match client.get(url).send().await {
        Ok(response) => (
            Some(response.status().as_u16()),
            started.elapsed().as_millis(),
            None,
        ),
        Err(err) => (None, started.elapsed().as_millis(), Some(err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_401_and_403_require_auth() {
        assert!(looks_unauthenticated(401, None, ""));
        assert!(looks_unauthenticated(403, None, ""));
        assert!(!looks_unauthenticated(500, None, ""));
    }

    #[test]
    fn redirect_to_login_requires_auth() {
        assert!(looks_unauthenticated(302, Some("/login"), ""));
        assert!(looks_unauthenticated(302, Some("https://app.test/Login?next=/x"), ""));
        assert!(!looks_unauthenticated(302, Some("/dashboard"), ""));
        assert!(!looks_unauthenticated(302, None, ""));
    }

    #[test]
    fn login_form_body_requires_auth() {
        let body = r#"<html><form method="post"><input name="password"></form>Login</html>"#;
        assert!(looks_unauthenticated(200, None, body));
        assert!(!looks_unauthenticated(200, None, "<html>Dashboard</html>"));
    }

    #[test]
    fn csrf_extraction_finds_laravel_token() {
        let html = r#"<input type="hidden" name="_token" value="abc123">"#;
        assert_eq!(
            extract_csrf(html),
            Some(("_token".to_string(), "abc123".to_string()))
        );
    }

    #[test]
    fn csrf_extraction_handles_value_before_name() {
        let html = r#"<input value="xyz" type="hidden" name="csrf_token">"#;
        assert_eq!(
            extract_csrf(html),
            Some(("csrf_token".to_string(), "xyz".to_string()))
        );
    }

    #[test]
    fn csrf_extraction_falls_back_to_meta_tag() {
        let html = r#"<meta name="csrf-token" content="meta-token">"#;
        assert_eq!(
            extract_csrf(html),
            Some(("_token".to_string(), "meta-token".to_string()))
        );
    }

    #[test]
    fn csrf_extraction_returns_none_without_token() {
        assert!(extract_csrf("<html><body>plain</body></html>").is_none());
    }

    #[test]
    fn url_resolution_joins_base_and_path() {
        assert_eq!(
            resolve_url("https://app.test/", "/api/users").unwrap(),
            "https://app.test/api/users"
        );
        assert_eq!(
            resolve_url("https://app.test", "api/users").unwrap(),
            "https://app.test/api/users"
        );
    }

    #[test]
    fn absolute_url_passes_through() {
        assert_eq!(
            resolve_url("https://app.test", "https://other.test/x").unwrap(),
            "https://other.test/x"
        );
    }

    #[test]
    fn relative_url_without_base_is_invalid() {
        let err = resolve_url("", "/api/users").unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    #[tokio::test]
    async fn manager_reuses_sessions_per_project() {
        let manager = HttpSessionManager::new();
        let first = manager.session("p1").await.unwrap();
        let second = manager.session("p1").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        assert!(manager.clear("p1").await);
        assert!(!manager.clear("p1").await);
    }
}
