use {
    anyhow::Result,
    clap::Subcommand,
    persisto_gateway::api_keys::{ApiKeyInfo, SqliteApiKeyStore},
};

#[derive(Subcommand)]
pub enum KeyAction {
    /// Issue a new API key for a tenant. The key is printed once.
    Create {
        #[arg(long)]
        tenant: String,
        /// Free-form note shown in listings.
        #[arg(long)]
        label: Option<String>,
    },
    /// List issued keys (prefixes only).
    List,
    /// Revoke a key.
    Revoke { key: String },
}

pub async fn handle_keys(action: KeyAction, database_url: &str) -> Result<()> {
    let store = SqliteApiKeyStore::connect(database_url).await?;
    match action {
        KeyAction::Create { tenant, label } => {
            let key = store.create(&tenant, label.as_deref()).await?;
            println!("{key}");
            eprintln!("Store this key now; it cannot be shown again.");
        },
        KeyAction::List => {
            let keys = store.list().await?;
            if keys.is_empty() {
                println!("No API keys issued.");
                return Ok(());
            }
            print!("{}", format_key_table(&keys));
        },
        KeyAction::Revoke { key } => {
            if store.revoke(&key).await? {
                println!("Key revoked.");
            } else {
                anyhow::bail!("unknown or already revoked key");
            }
        },
    }
    Ok(())
}

fn format_key_table(keys: &[ApiKeyInfo]) -> String {
    let mut out = format!(
        "{:<12} {:<20} {:<20} {:<25} STATUS\n",
        "PREFIX", "TENANT", "LABEL", "CREATED"
    );
    for k in keys {
        out.push_str(&format!(
            "{:<12} {:<20} {:<20} {:<25} {}\n",
            format!("{}…", k.prefix),
            k.tenant_id,
            k.label.as_deref().unwrap_or("-"),
            k.created_at.to_rfc3339(),
            if k.revoked { "revoked" } else { "active" },
        ));
    }
    out
}
