//! Thin CRUD over `connectors` — caller-configured HTTP tools exposed to
//! the chat orchestrator's LLM.

use ipnet::IpNet;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Connector, CreateConnectorRequest};

#[derive(Clone)]
pub struct ConnectorService {
    pool: PgPool,
}

impl ConnectorService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        org: Uuid,
        datasource_id: Uuid,
        request: CreateConnectorRequest,
    ) -> AppResult<Connector> {
        guard_endpoint(&request.endpoint).await?;
        let parameter_schema = serde_json::to_value(&request.parameters)
            .map_err(|e| AppError::InvalidRequest(format!("invalid parameter schema: {e}")))?;

        let connector = sqlx::query_as::<_, Connector>(
            r#"
            INSERT INTO connectors (id, organization_id, datasource_id, name, purpose, endpoint, method, parameter_schema, created_at)
            VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, now())
            RETURNING *
            "#,
        )
        .bind(org)
        .bind(datasource_id)
        .bind(&request.name)
        .bind(&request.purpose)
        .bind(&request.endpoint)
        .bind(request.method)
        .bind(parameter_schema)
        .fetch_one(&self.pool)
        .await?;
        Ok(connector)
    }

    pub async fn list_for_datasources(&self, org: Uuid, datasource_ids: &[Uuid]) -> AppResult<Vec<Connector>> {
        if datasource_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, Connector>(
            "SELECT * FROM connectors WHERE organization_id = $1 AND datasource_id = ANY($2)",
        )
        .bind(org)
        .bind(datasource_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get(&self, org: Uuid, connector_id: Uuid) -> AppResult<Connector> {
        sqlx::query_as::<_, Connector>(
            "SELECT * FROM connectors WHERE organization_id = $1 AND id = $2",
        )
        .bind(org)
        .bind(connector_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("connector '{connector_id}'")))
    }

    pub async fn delete(&self, org: Uuid, connector_id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM connectors WHERE organization_id = $1 AND id = $2")
            .bind(org)
            .bind(connector_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("connector '{connector_id}'")));
        }
        Ok(())
    }
}

/// Rejects connector endpoints that resolve to loopback/private/link-local
/// addresses or contain path-traversal segments — the same SSRF guard the
/// indexing pipeline applies to ingest URLs (sec 9). Hostnames (not just IP
/// literals) are resolved and every returned address is checked, so a
/// DNS name that only resolves to a private address is rejected too.
pub async fn guard_endpoint(endpoint: &str) -> AppResult<()> {
    if endpoint.contains("/../") || endpoint.contains("/./") {
        return Err(AppError::InvalidRequest("endpoint must not contain path traversal segments".into()));
    }
    let url = url::Url::parse(endpoint)
        .map_err(|e| AppError::InvalidRequest(format!("invalid endpoint url: {e}")))?;
    let Some(host) = url.host_str() else {
        return Err(AppError::InvalidRequest("endpoint must have a host".into()));
    };

    if let Ok(ip) = host.parse::<std::net::IpAddr>() {
        if is_private_or_loopback(ip) {
            return Err(AppError::InvalidRequest("endpoint must not resolve to a private address".into()));
        }
        return Ok(());
    }

    let port = url.port_or_known_default().unwrap_or(443);
    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| AppError::InvalidRequest(format!("endpoint host does not resolve: {e}")))?;

    let mut saw_any = false;
    for addr in addrs {
        saw_any = true;
        if is_private_or_loopback(addr.ip()) {
            return Err(AppError::InvalidRequest("endpoint must not resolve to a private address".into()));
        }
    }
    if !saw_any {
        return Err(AppError::InvalidRequest("endpoint host does not resolve to any address".into()));
    }
    Ok(())
}

fn is_private_or_loopback(ip: std::net::IpAddr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    match ip {
        std::net::IpAddr::V4(v4) => {
            v4.is_private()
                || v4.is_link_local()
                || "169.254.0.0/16".parse::<IpNet>().is_ok_and(|n| n.contains(&v4))
        }
        std::net::IpAddr::V6(v6) => v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guard_rejects_path_traversal() {
        assert!(guard_endpoint("https://example.com/../secret").await.is_err());
    }

    #[tokio::test]
    async fn guard_rejects_loopback_ip_literal() {
        assert!(guard_endpoint("http://127.0.0.1/hook").await.is_err());
    }

    #[tokio::test]
    async fn guard_rejects_link_local_ip_literal() {
        assert!(guard_endpoint("http://169.254.169.254/latest/meta-data").await.is_err());
    }

    #[tokio::test]
    async fn guard_rejects_private_ip_literal() {
        assert!(guard_endpoint("http://10.0.0.5/hook").await.is_err());
    }
}
