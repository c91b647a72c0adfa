//! HTTP testing tools: session login, endpoint probes, health checks.

use std::sync::Arc;

use chrono::Utc;

use chainguard_core::error::{ChainguardError, Result};
use chainguard_core::http_session::{health_probe, LoginCredentials};
use chainguard_core::model::{Alert, AlertSeverity};
use chainguard_protocol::format_timestamp;

use crate::dispatch::ToolCall;
use crate::handlers::{arg_str, arg_str_vec, required_str, AppState};

pub async fn set_base_url(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let base_url = required_str(&call.args, "base_url")?;
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ChainguardError::InvalidInput(
            "base_url must start with http:// or https://".to_string(),
        ));
    }

    let mut project_state = call.project.state().await;
    project_state.http_base_url = base_url.to_string();
    project_state.touch();
    call.project.save(&project_state, false).await?;

    Ok(vec![format!("Base URL: {}", base_url)])
}

pub async fn login(state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let credentials = LoginCredentials {
        login_url: required_str(&call.args, "login_url")?.to_string(),
        username: required_str(&call.args, "username")?.to_string(),
        password: required_str(&call.args, "password")?.to_string(),
        username_field: arg_str(&call.args, "username_field")
            .unwrap_or("email")
            .to_string(),
        password_field: arg_str(&call.args, "password_field")
            .unwrap_or("password")
            .to_string(),
    };

    let session = state.sessions.session(&call.project.project_id).await?;
    let mut session = session.lock().await;
    let result = session.login(credentials.clone()).await;

    let mut project_state = call.project.state().await;
    match result {
        Ok(message) => {
            // Scope-local: cleared when the scope ends, never written outside it.
            project_state
                .http_credentials
                .insert("login_url".to_string(), credentials.login_url);
            project_state
                .http_credentials
                .insert("username".to_string(), credentials.username);
            project_state
                .http_credentials
                .insert("password".to_string(), credentials.password);
            project_state.add_action("login: ok");
            project_state.touch();
            call.project.save(&project_state, false).await?;
            Ok(vec![message])
        }
        Err(err) => {
            project_state.alerts.push(Alert {
                message: format!("LOGIN_REQUIRED: {}", err),
                severity: AlertSeverity::Blocking,
                created_at: format_timestamp(Utc::now()),
                acknowledged: false,
            });
            project_state.touch();
            call.project.save(&project_state, false).await?;
            Err(err)
        }
    }
}

pub async fn test_endpoint(state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let url = required_str(&call.args, "url")?;
    let method = arg_str(&call.args, "method").unwrap_or("GET");
    let data = call.args.get("data").filter(|d| d.is_object());
    let headers: Vec<(String, String)> = call
        .args
        .get("headers")
        .and_then(serde_json::Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default();

    let base_url = call.project.state().await.http_base_url.clone();
    let session = state.sessions.session(&call.project.project_id).await?;
    let mut session = session.lock().await;
    session.base_url = base_url;
    let probe = session.test_endpoint(method, url, data, &headers).await?;
    drop(session);

    let mut project_state = call.project.state().await;
    project_state.http_tests_performed += 1;
    project_state.add_action(&format!("http {} {} -> {}", probe.method, url, probe.status));
    project_state.touch();
    call.project.save(&project_state, false).await?;
    drop(project_state);

    let mut lines = vec![format!(
        "{} {} -> {} ({} ms)",
        probe.method, probe.url, probe.status, probe.duration_ms
    )];
    if let Some(target) = &probe.redirected_to {
        lines.push(format!("redirect -> {}", target));
    }
    if probe.relogin_attempted {
        lines.push("(session expired; silent re-login attempted)".to_string());
    }
    if probe.auth_required {
        lines.push(
            "AUTH_REQUIRED: this endpoint wants a login (use the login tool first).".to_string(),
        );
    }
    if probe.status >= 400 {
        lines.push(format!("body: {}", probe.body_snippet));
    }
    Ok(vec![lines.join("\n")])
}

pub async fn clear_session(state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let cleared = state.sessions.clear(&call.project.project_id).await;
    Ok(vec![if cleared {
        "Session cleared (cookies and CSRF token dropped).".to_string()
    } else {
        "No session to clear.".to_string()
    }])
}

pub async fn health_check(_state: Arc<AppState>, call: ToolCall) -> Result<Vec<String>> {
    let features = call.project.state().await.features();
    if !features.health_checks {
        return Ok(vec![
            "health_check is only active in devops mode.".to_string()
        ]);
    }

    let endpoints = arg_str_vec(&call.args, "endpoints");
    let services = arg_str_vec(&call.args, "services");
    if endpoints.is_empty() && services.is_empty() {
        return Err(ChainguardError::InvalidInput(
            "give `endpoints` and/or `services` to check".to_string(),
        ));
    }

    let mut lines = Vec::new();
    for endpoint in &endpoints {
        let (status, duration_ms, error) = health_probe(endpoint).await;
        match status {
            Some(code) if code < 400 => {
                lines.push(format!("✓ {} -> {} ({} ms)", endpoint, code, duration_ms))
            }
            Some(code) => lines.push(format!("✗ {} -> {} ({} ms)", endpoint, code, duration_ms)),
            None => lines.push(format!(
                "✗ {} unreachable: {}",
                endpoint,
                error.unwrap_or_default()
            )),
        }
    }

    for service in &services {
        lines.push(check_service(service).await);
    }

    let mut project_state = call.project.state().await;
    project_state.add_action(&format!(
        "health: {} endpoint(s), {} service(s)",
        endpoints.len(),
        services.len()
    ));
    project_state.touch();
    call.project.save(&project_state, false).await?;

    Ok(vec![lines.join("\n")])
}

/// `systemctl is-active <service>`; degraded environments report SKIP.
async fn check_service(service: &str) -> String {
    if service.contains(|c: char| !c.is_ascii_alphanumeric() && c != '-' && c != '_' && c != '.') {
        return format!("✗ {}: invalid service name", service);
    }

    let output = tokio::process::Command::new("systemctl")
        .args(["is-active", service])
        .output()
        .await;

    match output {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if output.status.success() {
                format!("✓ service {}: {}", service, stdout)
            } else {
                format!("✗ service {}: {}", service, stdout)
            }
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            format!("SKIP service {}: systemctl not available", service)
        }
        Err(err) => format!("✗ service {}: {}", service, err),
    }
}
