// src/web/views.rs

// HTML pages; every caller-controlled string goes through `escape`

// dependencies
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use std::fmt::Write;

use crate::gate::FailedLogin;
use crate::metrics::AccessRequest;
use crate::record::RecordSnapshot;

const STYLE: &str = "body{font-family:sans-serif;margin:2rem}\
table{border-collapse:collapse}td,th{border:1px solid #ccc;padding:.25rem .5rem}";

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{title}</title>\
         <style>{STYLE}</style></head><body>{body}</body></html>"
    )
}

pub(crate) fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// The unlock form. Identical whatever the previous attempt's outcome.
pub(crate) fn unlock_page() -> String {
    page(
        "Unlock",
        "<h1>Unlock</h1>\
         <form method=\"post\" action=\"/unlock\">\
         <input type=\"password\" name=\"pass\" autofocus>\
         <button type=\"submit\">Unlock</button></form>",
    )
}

pub(crate) fn audit_page(
    records: &[RecordSnapshot],
    failed: &[(String, Vec<FailedLogin>)],
    recent: &[AccessRequest],
) -> String {
    let mut body = String::from("<h1>Granted</h1><table><tr><th>IP</th><th>Authed</th>\
        <th>Last access</th><th>Domains</th><th>Requests</th></tr>");
    for r in records {
        let ip = escape(&r.ip);
        let query = utf8_percent_encode(&r.ip, NON_ALPHANUMERIC);
        let last = r
            .last_access
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        let domains = escape(&r.domains_accessed.join(", "));
        let _ = write!(
            body,
            "<tr><td><a href=\"/buckets?ip={query}\">{ip}</a></td><td>{}</td><td>{last}</td>\
             <td>{domains}</td><td>{}</td></tr>",
            r.authed_at.to_rfc3339(),
            r.total_accesses(),
        );
    }
    body.push_str("</table>");

    body.push_str("<h1>Failed logins</h1><table><tr><th>IP</th><th>Attempt</th><th>When</th></tr>");
    for (ip, attempts) in failed {
        for attempt in attempts {
            let _ = write!(
                body,
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape(ip),
                escape(&attempt.secret),
                attempt.at.to_rfc3339(),
            );
        }
    }
    body.push_str("</table>");

    body.push_str("<h1>Recent access checks</h1><table><tr><th>IP</th><th>When</th>\
        <th>Method</th><th>Host</th><th>User agent</th></tr>");
    for req in recent.iter().rev() {
        let _ = write!(
            body,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(&req.ip),
            req.at.to_rfc3339(),
            escape(&req.method),
            escape(&req.host),
            escape(&req.user_agent),
        );
    }
    body.push_str("</table>");

    page("Audit", &body)
}

pub(crate) fn buckets_page(ip: &str, record: Option<&RecordSnapshot>) -> String {
    let ip = escape(ip);
    let Some(record) = record else {
        return page("Buckets", &format!("<h1>{ip}</h1><p>No record.</p>"));
    };

    let mut body = format!("<h1>{ip}</h1><table><tr><th>Hour</th><th>Requests</th></tr>");
    for (hour, count) in &record.buckets {
        let _ = write!(
            body,
            "<tr><td>{}</td><td>{count}</td></tr>",
            hour.to_rfc3339()
        );
    }
    body.push_str("</table>");
    page("Buckets", &body)
}
