//! `watch` command: follow the realtime channel until interrupted.

use chrono::Local;
use color_eyre::Result;
use tokio::sync::broadcast::error::RecvError;

use crate::client::BankClient;
use crate::realtime::ChannelState;
use crate::session::SessionEvent;

fn stamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

pub fn describe_state(state: ChannelState) -> String {
    match state {
        ChannelState::Disconnected => "disconnected".to_string(),
        ChannelState::Connecting => "connecting".to_string(),
        ChannelState::Authenticating => "authenticating".to_string(),
        ChannelState::Connected => "connected".to_string(),
        ChannelState::Reconnecting { attempt } => format!("reconnecting (attempt {})", attempt),
    }
}

pub async fn handle_watch_command(client: &BankClient) -> Result<()> {
    let mut channel = client.channel().subscribe();
    let mut unread = client.unread().subscribe();
    let mut events = client.session().events();

    let state = client.start().await;
    if !state.authenticated {
        println!("Not signed in.");
        return Ok(());
    }
    println!("[{}] watching {} (Ctrl-C to stop)", stamp(), client.config().channel.url);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = channel.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *channel.borrow_and_update();
                println!("[{}] channel {}", stamp(), describe_state(state));
            }
            changed = unread.changed() => {
                if changed.is_err() {
                    break;
                }
                let count = *unread.borrow_and_update();
                println!("[{}] unread notifications: {}", stamp(), count);
            }
            event = events.recv() => match event {
                Ok(SessionEvent::SignedOut { reason }) => {
                    println!("[{}] signed out: {}", stamp(), reason);
                    break;
                }
                Ok(SessionEvent::SignedIn) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    client.shutdown();
    Ok(())
}
