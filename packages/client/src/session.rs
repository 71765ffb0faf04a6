//! WebSocket client session management.

use futures_util::{SinkExt, StreamExt};
use parlor_server::domain::ChatMessage;
use rustyline::{DefaultEditor, error::ReadlineError};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

use crate::{error::ClientError, formatter::MessageFormatter};

use super::ui::{prompt, redisplay_prompt};

/// Build the frame carrying one chat line. An empty `text` only sets the name.
fn outbound_frame(username: &str, text: &str) -> Result<Message, ClientError> {
    let json = serde_json::to_string(&ChatMessage::message(username, text))?;
    Ok(Message::Text(json.into()))
}

/// Render a text frame from the server for display
fn render_text_frame(text: &str) -> String {
    match serde_json::from_str::<ChatMessage>(text) {
        Ok(message) => MessageFormatter::format(&message),
        Err(_) => MessageFormatter::format_raw_message(text),
    }
}

/// Run one chat session until the user quits or the server goes away.
///
/// The client announces `username` right after connecting, then sends every
/// entered line as a chat message. There is no reconnection.
pub async fn run_client(url: &str, username: &str) -> Result<(), ClientError> {
    tracing::info!("Connecting to {} as '{}'", url, username);

    let (ws_stream, _response) = connect_async(url)
        .await
        .map_err(|e| ClientError::ConnectionError(e.to_string()))?;

    tracing::info!("Connected to chat server!");
    println!(
        "\nYou are '{}'. Type messages and press Enter to send. Press Ctrl+C to exit.\n",
        username
    );

    let (mut write, mut read) = ws_stream.split();

    // Take the name before anything else so the join notice goes out first.
    write
        .send(outbound_frame(username, "")?)
        .await
        .map_err(|_| ClientError::ConnectionLost)?;

    // Spawn a task to handle incoming messages
    let username_for_read = username.to_string();
    let mut read_task = tokio::spawn(async move {
        let mut connection_error = false;

        while let Some(message) = read.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    print!("{}", render_text_frame(text.as_str()));
                    redisplay_prompt(&username_for_read);
                }
                Ok(Message::Binary(data)) => {
                    print!("{}", MessageFormatter::format_binary_message(data.len()));
                    redisplay_prompt(&username_for_read);
                }
                Ok(Message::Close(_)) => {
                    tracing::info!("Server closed the connection");
                    connection_error = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!("WebSocket read error: {}", e);
                    connection_error = true;
                    break;
                }
                _ => {}
            }
        }

        connection_error
    });

    // Create channel for rustyline input
    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();

    // Spawn a blocking thread for rustyline (synchronous readline)
    let prompt = prompt(username);
    let _readline_handle = std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("Failed to initialize readline: {}", e);
                return;
            }
        };

        loop {
            match rl.readline(&prompt) {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    rl.add_history_entry(line.as_str()).ok();
                    if input_tx.send(line).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    // Ctrl+C
                    tracing::info!("Interrupted");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    // Ctrl+D
                    tracing::info!("EOF");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });

    // Forward entered lines to the server
    let username_for_write = username.to_string();
    let mut write_task = tokio::spawn(async move {
        let mut write_error = false;

        while let Some(line) = input_rx.recv().await {
            let frame = match outbound_frame(&username_for_write, &line) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!("{}", e);
                    continue;
                }
            };

            if let Err(e) = write.send(frame).await {
                tracing::warn!("Failed to send message: {}", e);
                write_error = true;
                break;
            }
        }

        // The user quit: say goodbye properly.
        if !write_error {
            write.send(Message::Close(None)).await.ok();
        }

        write_error
    });

    // If any one of the tasks completes, abort the other
    tokio::select! {
        read_result = &mut read_task => {
            write_task.abort();
            if read_result.unwrap_or(true) {
                return Err(ClientError::ConnectionLost);
            }
        }
        write_result = &mut write_task => {
            read_task.abort();
            if write_result.unwrap_or(true) {
                return Err(ClientError::ConnectionLost);
            }
        }
    }

    Ok(())
}
