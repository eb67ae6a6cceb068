//! `status`, `logout` and `device-id` commands.

use color_eyre::Result;

use crate::client::BankClient;
use crate::session::SessionState;

/// Human-readable status block.
pub fn format_status(state: &SessionState, device_id: &str, api_url: &str) -> String {
    let who = match (&state.user, state.authenticated) {
        (_, false) => "signed out".to_string(),
        (Some(user), true) => match &user.name {
            Some(name) => format!("signed in as {} ({})", name, user.id),
            None => format!("signed in as {}", user.id),
        },
        (None, true) => "signed in".to_string(),
    };
    format!("session:   {}\ndevice:    {}\napi:       {}", who, device_id, api_url)
}

pub async fn handle_status_command(client: &BankClient) -> Result<()> {
    let state = client.session().initialize().await;
    let device_id = client.store().device_id().await;
    println!(
        "{}",
        format_status(&state, &device_id, &client.config().api.base_url)
    );
    Ok(())
}

pub async fn handle_logout_command(client: &BankClient) -> Result<()> {
    let state = client.session().initialize().await;
    if !state.authenticated {
        println!("Not signed in.");
        return Ok(());
    }
    client.logout().await;
    println!("Signed out.");
    Ok(())
}

pub async fn handle_device_id_command(client: &BankClient) -> Result<()> {
    println!("{}", client.store().device_id().await);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::UserProfile;

    #[test]
    fn test_format_signed_out() {
        let out = format_status(&SessionState::default(), "dev-1", "https://api.test");
        assert!(out.contains("signed out"));
        assert!(out.contains("dev-1"));
        assert!(out.contains("https://api.test"));
    }

    #[test]
    fn test_format_signed_in_with_name() {
        let state = SessionState {
            user: Some(UserProfile {
                id: "user-1".to_string(),
                name: Some("Ada".to_string()),
                phone: None,
            }),
            authenticated: true,
            loading: false,
        };
        let out = format_status(&state, "dev-1", "https://api.test");
        assert!(out.contains("signed in as Ada (user-1)"));
    }

    #[test]
    fn test_format_signed_in_without_profile() {
        let state = SessionState {
            user: None,
            authenticated: true,
            loading: false,
        };
        assert!(format_status(&state, "d", "u").starts_with("session:   signed in\n"));
    }
}
