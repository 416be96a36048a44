use anyhow::Result;
use nutri_core::credential::Credentials;
use nutri_infrastructure::FileCredentialStore;

pub async fn login(store: &FileCredentialStore, token: String, user_id: String) -> Result<()> {
    store.save(&Credentials { token, user_id }).await?;
    println!("✅ Signed in.");
    Ok(())
}

pub async fn logout(store: &FileCredentialStore) -> Result<()> {
    store.clear().await?;
    println!("Signed out.");
    Ok(())
}
