//! Human readable listing of the queue, in the style of `mailq`

use std::fmt::Write;

use spoolmail_store::EmailRecord;

const HEADER: &str = "-Queue ID- --Size-- ----Arrival Time---- -Sender/Recipient-------";

/// Render `emails` as a table, one entry per email, followed by a size total
#[must_use]
pub fn render(emails: &[EmailRecord]) -> String {
    if emails.is_empty() {
        return "Mail queue is empty\n".to_string();
    }

    let mut out = String::new();
    let mut total_size = 0;

    let _ = writeln!(out, "{HEADER}");
    for email in emails {
        let size = email.size();
        total_size += size;

        let arrival = email.created().map_or_else(
            || format!("{:>20}", "Unknown"),
            |created| created.format("%a %b %d %H:%M:%S").to_string(),
        );

        let _ = writeln!(
            out,
            "{:>10} {:>8} {}  {}",
            email.id, size, arrival, email.from_address
        );
        if let Some(attempted) = email.last_attempted() {
            let _ = writeln!(
                out,
                "Last send attempt: {}",
                attempted.format("%Y-%m-%d %H:%M:%S %z")
            );
        }
        let _ = writeln!(out, "{:41}{}", "", email.to_address);
        out.push('\n');
    }

    let _ = writeln!(
        out,
        "-- {} Kbytes in {} Requests.",
        total_size / 1024,
        emails.len()
    );

    out
}
