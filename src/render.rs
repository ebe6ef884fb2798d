//! nginx configuration rendering
//!
//! One of three templates, selected by backend kind. Output is literal,
//! unapplied config text; rendering the same spec twice yields byte-identical
//! output so re-runs can prove idempotence by hash.
//!
//! Contract points baked into the templates:
//! - each location uses the trailing-slash prefix form with a trailing-slash
//!   `proxy_pass`, so the upstream sees root-relative paths;
//! - upstream blocks keep a keepalive pool, and pooled requests clear the
//!   `Connection` header;
//! - the relay location negotiates the websocket upgrade handshake and turns
//!   off buffering with long read/send timeouts;
//! - `client_max_body_size` mirrors the document database's payload ceiling;
//! - unified mode emits two location blocks under one TLS server block, and
//!   the trailing-slash forms keep `/sync` from capturing `/sync2`.

use crate::backend::{BackendKind, BackendSpec, Upstream};

const DB_UPSTREAM_NAME: &str = "notes_db";
const RELAY_UPSTREAM_NAME: &str = "notes_relay";

/// Render the site configuration for a backend spec
pub fn render(spec: &BackendSpec) -> String {
    let mut out = String::with_capacity(2048);
    out.push_str("# managed by notesctl - regenerated on every apply, do not edit\n\n");

    if spec.kind.includes_database() {
        out.push_str(&upstream_block(DB_UPSTREAM_NAME, &spec.db_upstream));
    }
    if spec.kind.includes_relay() {
        out.push_str(&upstream_block(RELAY_UPSTREAM_NAME, &spec.relay_upstream));
    }

    out.push_str(&redirect_server(&spec.domain));
    out.push_str(&tls_server(spec));
    out
}

fn upstream_block(name: &str, upstream: &Upstream) -> String {
    format!(
        "upstream {name} {{\n    server {upstream};\n    keepalive 16;\n}}\n\n",
        name = name,
        upstream = upstream,
    )
}

/// Plain-HTTP listener that only redirects to TLS
fn redirect_server(domain: &str) -> String {
    format!(
        "server {{\n\
         \x20   listen 80;\n\
         \x20   listen [::]:80;\n\
         \x20   server_name {domain};\n\
         \x20   return 301 https://$host$request_uri;\n\
         }}\n\n",
        domain = domain,
    )
}

fn tls_server(spec: &BackendSpec) -> String {
    let mut out = String::new();
    out.push_str("server {\n");
    out.push_str("    listen 443 ssl http2;\n");
    out.push_str("    listen [::]:443 ssl http2;\n");
    out.push_str(&format!("    server_name {};\n\n", spec.domain));
    out.push_str(&format!(
        "    ssl_certificate /etc/letsencrypt/live/{}/fullchain.pem;\n",
        spec.domain
    ));
    out.push_str(&format!(
        "    ssl_certificate_key /etc/letsencrypt/live/{}/privkey.pem;\n\n",
        spec.domain
    ));
    out.push_str(&format!(
        "    client_max_body_size {};\n",
        spec.max_body_size
    ));

    match spec.kind {
        BackendKind::DocumentDatabase => {
            out.push_str(&database_location(&spec.db_prefix));
        }
        BackendKind::Relay => {
            out.push_str(&relay_location(&spec.relay_prefix));
        }
        BackendKind::Both => {
            out.push_str(&database_location(&spec.db_prefix));
            out.push_str(&relay_location(&spec.relay_prefix));
        }
    }

    out.push_str("}\n");
    out
}

/// Location pair for the document database
///
/// The exact-match block redirects the bare prefix into the slash form; the
/// slash form strips the prefix before forwarding.
fn database_location(prefix: &str) -> String {
    format!(
        "\n\
         \x20   location = {prefix} {{\n\
         \x20       return 301 {prefix}/;\n\
         \x20   }}\n\
         \n\
         \x20   location {prefix}/ {{\n\
         \x20       proxy_pass http://{upstream}/;\n\
         \x20       proxy_http_version 1.1;\n\
         \x20       proxy_set_header Connection \"\";\n\
         \x20       proxy_set_header Host $host;\n\
         \x20       proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;\n\
         \x20       proxy_set_header X-Forwarded-Proto $scheme;\n\
         \x20   }}\n",
        prefix = prefix,
        upstream = DB_UPSTREAM_NAME,
    )
}

/// Location pair for the realtime relay, with the upgrade handshake
fn relay_location(prefix: &str) -> String {
    format!(
        "\n\
         \x20   location = {prefix} {{\n\
         \x20       return 301 {prefix}/;\n\
         \x20   }}\n\
         \n\
         \x20   location {prefix}/ {{\n\
         \x20       proxy_pass http://{upstream}/;\n\
         \x20       proxy_http_version 1.1;\n\
         \x20       proxy_set_header Upgrade $http_upgrade;\n\
         \x20       proxy_set_header Connection \"upgrade\";\n\
         \x20       proxy_set_header Host $host;\n\
         \x20       proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;\n\
         \x20       proxy_set_header X-Forwarded-Proto $scheme;\n\
         \x20       proxy_read_timeout 3600s;\n\
         \x20       proxy_send_timeout 3600s;\n\
         \x20       proxy_buffering off;\n\
         \x20   }}\n",
        prefix = prefix,
        upstream = RELAY_UPSTREAM_NAME,
    )
}
