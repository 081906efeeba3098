//! Tests for submit parsing, global options and item files.

use super::parse;
use crate::cli::commands::items_from_text;
use crate::cli::{Cli, CliCommand};
use clap::Parser;

#[test]
fn cli_parse_submit_urls() {
    match parse(&["fetchq", "submit", "https://a/x.bin", "https://b/y.bin"]) {
        CliCommand::Submit {
            urls,
            file,
            priority,
            metadata,
            wait,
        } => {
            assert_eq!(urls, vec!["https://a/x.bin", "https://b/y.bin"]);
            assert!(file.is_none());
            assert!(priority.is_none());
            assert!(metadata.is_none());
            assert!(wait.is_none());
        }
        _ => panic!("expected Submit"),
    }
}

#[test]
fn cli_parse_submit_options() {
    match parse(&[
        "fetchq",
        "submit",
        "--file",
        "batch.json",
        "--priority",
        "9",
        "--metadata",
        r#"{"tag":"x"}"#,
        "--wait",
        "60",
    ]) {
        CliCommand::Submit {
            urls,
            file,
            priority,
            metadata,
            wait,
        } => {
            assert!(urls.is_empty());
            assert_eq!(file.unwrap().to_string_lossy(), "batch.json");
            assert_eq!(priority, Some(9));
            assert_eq!(metadata.as_deref(), Some(r#"{"tag":"x"}"#));
            assert_eq!(wait, Some(60));
        }
        _ => panic!("expected Submit"),
    }
}

#[test]
fn cli_parse_priority_out_of_u8_range_rejected() {
    assert!(Cli::try_parse_from(["fetchq", "submit", "--priority", "300", "https://a/x"]).is_err());
}

#[test]
fn cli_global_options_after_subcommand() {
    let cli = Cli::try_parse_from(["fetchq", "list", "--owner", "alice", "--json"]).unwrap();
    assert_eq!(cli.owner, "alice");
    assert!(cli.json);
    assert!(cli.config.is_none());
}

#[test]
fn cli_owner_defaults_to_local() {
    let cli = Cli::try_parse_from(["fetchq", "--config", "/tmp/c.toml", "run"]).unwrap();
    assert_eq!(cli.owner, "local");
    assert!(!cli.json);
    assert_eq!(cli.config.unwrap().to_string_lossy(), "/tmp/c.toml");
}

#[test]
fn items_from_url_lines() {
    let text = "# batch\nhttps://a/1.bin\n\n  https://a/2.bin  \n";
    let items = items_from_text(text).unwrap();
    let urls: Vec<_> = items.iter().map(|i| i.url.as_str()).collect();
    assert_eq!(urls, vec!["https://a/1.bin", "https://a/2.bin"]);
    assert!(items[0].destination_hint.is_none());
}

#[test]
fn items_from_json_array() {
    let text = r#"[
        {"url": "https://a/1.bin", "destination_hint": "one.bin"},
        {"url": "https://a/2.bin", "expected_size": 42}
    ]"#;
    let items = items_from_text(text).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].destination_hint.as_deref(), Some("one.bin"));
    assert_eq!(items[1].expected_size, Some(42));
}

#[test]
fn items_from_bad_json_is_error() {
    assert!(items_from_text("[{\"nope\": 1}]").is_err());
}
