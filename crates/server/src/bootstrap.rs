//! Admin token initialization.

use anyhow::{Context, Result, bail};
use chartvault_core::config::AdminConfig;
use chartvault_core::token::TokenScope;
use chartvault_metadata::models::TokenRow;
use chartvault_metadata::{MetadataError, MetadataStore};
use time::OffsetDateTime;
use uuid::Uuid;

/// Ensure the configured admin token exists and return its id.
///
/// The admin token is global (not tied to a repository). When the configured
/// hash changes between restarts the previous admin token is revoked and a
/// new one created.
pub async fn ensure_admin_token(metadata: &dyn MetadataStore, config: &AdminConfig) -> Result<Uuid> {
    let hash = normalize_token_hash(&config.token_hash)?;
    let now = OffsetDateTime::now_utc();

    if let Some(existing) = metadata.get_token_by_hash(&hash).await? {
        if existing.revoked_at.is_some() {
            bail!(
                "admin token hash matches a revoked token (id={}); use a new token hash",
                existing.token_id
            );
        }
        if let Some(expires_at) = existing.expires_at
            && expires_at <= now
        {
            bail!(
                "admin token hash matches an expired token (id={}, expired={}); \
                 use a new token hash",
                existing.token_id,
                expires_at
            );
        }
        metadata.set_bootstrap_token_id(existing.token_id).await?;
        tracing::debug!(token_id = %existing.token_id, "Admin token already exists");
        return Ok(existing.token_id);
    }

    if let Some(prev_id) = metadata.get_bootstrap_token_id().await? {
        match metadata.revoke_token(prev_id, now).await {
            Ok(()) => tracing::info!(token_id = %prev_id, "Previous admin token revoked"),
            Err(MetadataError::NotFound(_)) => {
                tracing::warn!(token_id = %prev_id, "Previous admin token no longer exists")
            }
            Err(e) => return Err(e).context("failed to revoke previous admin token"),
        }
    }

    let scopes = admin_scopes(config)?;
    let token = TokenRow {
        token_id: Uuid::new_v4(),
        repository: None,
        token_hash: hash,
        scopes: serde_json::to_string(&scopes)?,
        expires_at: None,
        revoked_at: None,
        created_at: now,
        last_used_at: None,
        description: config.token_description.clone(),
    };

    metadata.create_token(&token).await?;
    metadata.set_bootstrap_token_id(token.token_id).await?;
    tracing::info!(token_id = %token.token_id, ?scopes, "Admin token created");

    Ok(token.token_id)
}

/// Strip an optional `sha256:` prefix and lowercase, matching the hex
/// produced when hashing presented bearer tokens.
fn normalize_token_hash(raw: &str) -> Result<String> {
    let hash = raw.strip_prefix("sha256:").unwrap_or(raw).to_lowercase();
    if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("invalid admin token_hash: expected 64 hex chars");
    }
    Ok(hash)
}

fn admin_scopes(config: &AdminConfig) -> Result<Vec<String>> {
    let scopes = config
        .token_scopes
        .clone()
        .unwrap_or_else(|| vec![TokenScope::RepoAdmin.as_str().to_string()]);
    for scope in &scopes {
        TokenScope::parse(scope).map_err(|_| anyhow::anyhow!("invalid admin scope: {scope}"))?;
    }
    Ok(scopes)
}
