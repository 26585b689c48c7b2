//! Plain-text rendering of session views

use postern_core::views::{ContactView, IdentityView, InboundView, OutboundView};
use postern_core::{ContactId, MessageId, Timestamp};

pub fn identity(view: &IdentityView) -> String {
    format!(
        "server:      {}\npublic key:  {}\nidentity:    {}\nfingerprint: {}\ngeneration:  {}",
        view.server, view.public_key, view.identity_public, view.fingerprint, view.generation
    )
}

/// One line per contact
pub fn contact_line(view: &ContactView) -> String {
    if view.pending {
        format!("{}  {}  (pending)", view.id, view.name)
    } else {
        format!(
            "{}  {}  {}",
            view.id,
            view.name,
            view.fingerprint.map(|f| f.to_string()).unwrap_or_default()
        )
    }
}

pub fn contact(view: &ContactView) -> String {
    let mut text = contact_line(view);
    if let (Some(server), Some(key)) = (&view.server, &view.public_key) {
        text.push_str(&format!("\n  server:     {server}\n  public key: {key}"));
    }
    text
}

pub fn inbound_line(view: &InboundView, from: &str) -> String {
    let flag = match (view.sealed, view.read) {
        (true, _) => "sealed",
        (false, false) => "new",
        (false, true) => "read",
    };
    let preview = view
        .body
        .as_deref()
        .map(|body| body.lines().next().unwrap_or_default())
        .unwrap_or_default();
    format!("{}  {:<6}  {:<12}  {}", view.id, flag, from, preview)
}

pub fn inbound(view: &InboundView, from: &str) -> String {
    let mut text = format!(
        "id:       {}\nfrom:     {}\nreceived: {}\nerases:   {}\nacked:    {}",
        view.id,
        from,
        view.received,
        view.erase_time,
        if view.acked { "yes" } else { "no" }
    );
    if let Some(reply) = view.in_reply_to {
        text.push_str(&format!("\nreply to: {reply}"));
    }
    for name in &view.attachments {
        text.push_str(&format!("\nattached: {name}"));
    }
    match &view.body {
        Some(body) => text.push_str(&format!("\n\n{body}")),
        None => text.push_str("\n\n(sealed until the key exchange completes)"),
    }
    text
}

pub fn outbound_line(view: &OutboundView, to: &str) -> String {
    let preview = view.body.lines().next().unwrap_or_default();
    format!(
        "{}  {:<6}  {:<12}  {}",
        view.id,
        format!("{:?}", view.status).to_lowercase(),
        to,
        preview
    )
}

pub fn usage(size: usize, limit: usize) -> String {
    let percent = if limit == 0 { 100 } else { size * 100 / limit };
    let verdict = if size > limit { "  too large" } else { "" };
    format!("{size} of {limit} bytes ({percent}%){verdict}")
}

pub fn expired(removed: &[MessageId]) -> String {
    match removed.len() {
        0 => "nothing to purge".to_string(),
        1 => "purged 1 message".to_string(),
        n => format!("purged {n} messages"),
    }
}

pub fn activity(time: Timestamp, text: &str) -> String {
    format!("[{time}] {text}")
}

/// Contact name for an id, or the id itself when unknown
pub fn name_of(contacts: &[ContactView], id: ContactId) -> String {
    contacts
        .iter()
        .find(|c| c.id == id)
        .map(|c| c.name.clone())
        .unwrap_or_else(|| id.to_string())
}
