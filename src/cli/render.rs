//! Terminal rendering of framed events.

use colored::*;
use eyre::Result;
use std::io::{self, Write};

use nexus::framing::{EventName, FramedEvent};
use nexus::session::EventStreamHandle;

/// Terminal text for one event; None for events that print nothing
pub fn describe(event: &FramedEvent) -> Option<String> {
    let field = |name: &str| event.data.get(name).and_then(|v| v.as_str()).unwrap_or_default().to_string();

    match event.event {
        EventName::Session => {
            let label = if event.data["isNew"].as_bool().unwrap_or(false) {
                "New conversation"
            } else {
                "Conversation"
            };
            Some(format!("{} {}\n", label.dimmed(), field("sessionId").dimmed()))
        }
        EventName::Thinking => event.text().filter(|t| !t.is_empty()).map(|t| t.dimmed().to_string()),
        EventName::Content => event.text().filter(|t| !t.is_empty()).map(str::to_string),
        EventName::Topic => {
            let order = event.data["sequenceOrder"].as_u64().unwrap_or_default();
            let minutes = event.data["estimatedMinutes"].as_u64().unwrap_or_default();
            Some(format!(
                "\n{} {} {}",
                format!("#{}", order).cyan(),
                field("title").bold(),
                format!("({} min)", minutes).dimmed()
            ))
        }
        EventName::Done => {
            let detail = match event.data.get("roadmapId") {
                Some(id) => format!(
                    "roadmap {} with {} topics",
                    id.as_str().unwrap_or("-"),
                    event.data["totalTopics"].as_u64().unwrap_or_default()
                ),
                None => format!("{} ({})", field("sessionId"), field("model")),
            };
            Some(format!("\n{} {}\n", "Done:".green(), detail))
        }
        EventName::Error => Some(format!("\n{} {}\n", "Error:".red(), field("message"))),
    }
}

/// Print events until the session ends, mapping Ctrl-C to cancellation.
///
/// Returns false when the session ended with an error event.
pub async fn render(mut handle: EventStreamHandle, raw: bool) -> Result<bool> {
    let cancel = handle.cancel_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupted, cancelling session");
            cancel.cancel();
        }
    });

    let mut stdout = io::stdout();
    let mut succeeded = true;
    while let Some(event) = handle.recv().await {
        if event.event == EventName::Error {
            succeeded = false;
        }
        if raw {
            write!(stdout, "{}", event.to_sse())?;
        } else if let Some(text) = describe(&event) {
            write!(stdout, "{}", text)?;
        }
        stdout.flush()?;
    }

    ctrl_c.abort();
    Ok(succeeded)
}
