//! Property tests for nginx site rendering.

use proptest::prelude::*;

use notesctl::{render, BackendSpec, Config};

fn domain() -> impl Strategy<Value = String> {
    let label = proptest::string::string_regex("[a-z][a-z0-9]{0,11}").unwrap();
    proptest::collection::vec(label, 2..=4).prop_map(|labels| labels.join("."))
}

fn prefix() -> impl Strategy<Value = String> {
    proptest::string::string_regex("/[a-z][a-z0-9_-]{0,11}").unwrap()
}

fn spec_for(domain: &str, db_path: &str, relay_path: &str) -> Option<BackendSpec> {
    let mut config = Config::default();
    config.domain = domain.to_string();
    config.backend.kind = "both".to_string();
    config.backend.db_path = db_path.to_string();
    config.backend.relay_path = relay_path.to_string();
    BackendSpec::from_config(&config, true).ok()
}

/// Prefix-location matcher mimicking nginx longest-prefix selection
fn winning_location(config: &str, request_path: &str) -> Option<String> {
    let mut best: Option<String> = None;
    for line in config.lines() {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix("location ") else {
            continue;
        };
        let prefix = rest.trim_end_matches('{').trim();
        if let Some(exact) = prefix.strip_prefix("= ") {
            if request_path == exact {
                return Some(prefix.to_string());
            }
            continue;
        }
        if request_path.starts_with(prefix)
            && best.as_deref().map_or(true, |b| prefix.len() > b.len())
        {
            best = Some(prefix.to_string());
        }
    }
    best
}

#[test]
fn sync2_requests_are_never_captured_by_sync() {
    let spec = spec_for("notes.example.com", "/sync", "/sync2").unwrap();
    let text = render(&spec);
    assert_eq!(
        winning_location(&text, "/sync2/ws").as_deref(),
        Some("/sync2/")
    );
    assert_eq!(
        winning_location(&text, "/sync/db/doc").as_deref(),
        Some("/sync/")
    );
    assert_eq!(
        winning_location(&text, "/sync2").as_deref(),
        Some("= /sync2")
    );
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    /// PROPERTY: Rendering is deterministic for any accepted configuration.
    #[test]
    fn property_render_is_deterministic(
        domain in domain(),
        db_path in prefix(),
        relay_path in prefix(),
    ) {
        if let Some(spec) = spec_for(&domain, &db_path, &relay_path) {
            prop_assert_eq!(render(&spec), render(&spec));
        }
    }

    /// PROPERTY: Every accepted prefix produces a trailing-slash location
    /// whose proxy_pass ends in a slash, so the prefix is stripped upstream.
    #[test]
    fn property_locations_strip_the_prefix(
        domain in domain(),
        db_path in prefix(),
        relay_path in prefix(),
    ) {
        if let Some(spec) = spec_for(&domain, &db_path, &relay_path) {
            let text = render(&spec);
            let db_location = format!("location {}/ {{", spec.db_prefix);
            let relay_location = format!("location {}/ {{", spec.relay_prefix);
            prop_assert!(text.contains(&db_location));
            prop_assert!(text.contains(&relay_location));
            prop_assert!(text.contains("proxy_pass http://notes_db/;"));
            prop_assert!(text.contains("proxy_pass http://notes_relay/;"));
        }
    }

    /// PROPERTY: A prefix that textually extends the other is a distinct
    /// route; requests under it are never captured by the shorter prefix.
    #[test]
    fn property_textual_extension_is_not_shadowed(
        domain in domain(),
        base in prefix(),
        tail in "[a-z0-9]{1,4}",
    ) {
        let extended = format!("{}{}", base, tail);
        if let Some(spec) = spec_for(&domain, &base, &extended) {
            let text = render(&spec);
            let request = format!("{}/ws", spec.relay_prefix);
            let winner = winning_location(&text, &request);
            let expected = format!("{}/", spec.relay_prefix);
            prop_assert_eq!(winner.as_deref(), Some(expected.as_str()));
        }
    }

    /// PROPERTY: The TLS certificate paths always follow the per-domain
    /// letsencrypt convention for the configured domain.
    #[test]
    fn property_tls_material_follows_domain(
        domain in domain(),
    ) {
        if let Some(spec) = spec_for(&domain, "/sync", "/relay") {
            let text = render(&spec);
            let cert_line = format!(
                "ssl_certificate /etc/letsencrypt/live/{}/fullchain.pem;",
                domain
            );
            let server_name_line = format!("server_name {};", domain);
            prop_assert!(text.contains(&cert_line));
            prop_assert!(text.contains(&server_name_line));
        }
    }
}
