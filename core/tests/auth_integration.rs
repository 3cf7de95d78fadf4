/*
 * auth_integration.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * Integration test for the authentication core: a client-side SASL engine
 * talking to the server-side AUTH glue through the real base64 wire
 * encoding, for every mechanism, with plaintext and masked secrets on
 * either side.
 *
 * Run with:
 *   cargo test -p staffetta_core --test auth_integration
 */

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use staffetta_core::auth::{Cram, SaslClient, SecretsFile};
use staffetta_core::hash::{self, HashType};
use staffetta_core::protocol::pop3::auth::Pop3Auth;
use staffetta_core::protocol::smtp::auth::AuthVerb;

/// Run a full AUTH dialog between the client engine and the server glue,
/// exactly as the SMTP session would: advertisement, mechanism selection,
/// optional initial response, then base64 challenge/response rounds.
fn run_dialog(
    server_store: &SecretsFile,
    client_store: &SecretsFile,
    client_config: &str,
) -> (bool, String, String) {
    let mut server = AuthVerb::new(server_store, "", "relay.example.com");
    let mut client = SaslClient::new(client_store, client_config);

    let advertisement = server.advertisement(false).expect("server offers AUTH");
    let mechanisms: Vec<String> = advertisement
        .strip_prefix("AUTH ")
        .unwrap()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    let mechanism = client.select_mechanism(&mechanisms, "");
    assert!(!mechanism.is_empty(), "no common mechanism");

    let initial = client.initial_response("", 450);
    let mut reply = if initial.data.is_empty() {
        server.begin(false, &mechanism)
    } else {
        server.begin(
            false,
            &format!("{} {}", mechanism, BASE64.encode(&initial.data)),
        )
    };
    loop {
        match reply.code {
            235 => {
                return (
                    true,
                    server.id().to_string(),
                    mechanism,
                );
            }
            334 => {
                let challenge = BASE64.decode(reply.text.trim()).unwrap();
                let response = client.response(&mechanism, &challenge, "");
                if response.error {
                    let cancelled = server.respond("*");
                    assert_eq!(cancelled.code, 501);
                    return (false, String::new(), mechanism);
                }
                reply = server.respond(&BASE64.encode(&response.data));
            }
            _ => {
                return (false, String::new(), mechanism);
            }
        }
    }
}

fn masked_md5_line(side: &str, id: &str, password: &[u8]) -> String {
    let masked = hash::mask(HashType::Md5, password).unwrap();
    format!("{} cram-md5 {} {}\n", side, id, BASE64.encode(&masked))
}

#[test]
fn every_mechanism_end_to_end() {
    let server_store = SecretsFile::parse("server plain alice pencil\n", "server");
    let client_store = SecretsFile::parse("client plain alice pencil\n", "client");
    for config in ["m:plain", "m:login", "m:cram-md5", "m:cram-sha1", "m:cram-sha256"] {
        let (ok, id, mechanism) = run_dialog(&server_store, &client_store, config);
        assert!(ok, "mechanism {} failed", mechanism);
        assert_eq!(id, "alice", "mechanism {}", mechanism);
    }
}

#[test]
fn strongest_mechanism_is_preferred() {
    let server_store = SecretsFile::parse("server plain alice pencil\n", "server");
    let client_store = SecretsFile::parse("client plain alice pencil\n", "client");
    let (ok, _, mechanism) = run_dialog(&server_store, &client_store, "");
    assert!(ok);
    assert_eq!(mechanism, "CRAM-SHA256");
}

#[test]
fn masked_server_secret_end_to_end() {
    let server_store = SecretsFile::parse(&masked_md5_line("server", "alice", b"pencil"), "server");
    let client_store = SecretsFile::parse("client plain alice pencil\n", "client");
    let (ok, id, mechanism) = run_dialog(&server_store, &client_store, "");
    assert!(ok);
    assert_eq!(id, "alice");
    assert_eq!(mechanism, "CRAM-MD5");
}

#[test]
fn masked_client_secret_end_to_end() {
    let server_store = SecretsFile::parse("server plain alice pencil\n", "server");
    let client_store = SecretsFile::parse(&masked_md5_line("client", "alice", b"pencil"), "client");
    let (ok, id, mechanism) = run_dialog(&server_store, &client_store, "");
    assert!(ok);
    assert_eq!(id, "alice");
    assert_eq!(mechanism, "CRAM-MD5");
}

#[test]
fn masked_on_both_sides_end_to_end() {
    let server_store = SecretsFile::parse(&masked_md5_line("server", "alice", b"pencil"), "server");
    let client_store = SecretsFile::parse(&masked_md5_line("client", "alice", b"pencil"), "client");
    let (ok, id, _) = run_dialog(&server_store, &client_store, "");
    assert!(ok);
    assert_eq!(id, "alice");
}

#[test]
fn wrong_password_fails_every_mechanism() {
    let server_store = SecretsFile::parse("server plain alice pencil\n", "server");
    let client_store = SecretsFile::parse("client plain alice quill\n", "client");
    for config in ["m:plain", "m:login", "m:cram-md5"] {
        let (ok, id, mechanism) = run_dialog(&server_store, &client_store, config);
        assert!(!ok, "mechanism {} unexpectedly passed", mechanism);
        assert!(id.is_empty());
    }
}

#[test]
fn unknown_user_fails() {
    let server_store = SecretsFile::parse("server plain alice pencil\n", "server");
    let client_store = SecretsFile::parse("client plain mallory pencil\n", "client");
    let (ok, _, _) = run_dialog(&server_store, &client_store, "m:cram-md5");
    assert!(!ok);
}

#[test]
fn pop3_apop_end_to_end() {
    let server_store = SecretsFile::parse("server plain mrose tanstaaf\n", "server");
    let client_store = SecretsFile::parse("client plain mrose tanstaaf\n", "client");
    let mut server = Pop3Auth::new(&server_store, true, false, "", "relay.example.com");
    let mut client = SaslClient::new(&client_store, "");

    let greeting = server.greeting();
    let banner = &greeting[greeting.find('<').unwrap()..];
    let response = client.response("APOP", banner.as_bytes(), "");
    assert!(!response.error);
    let reply = server.apop(&String::from_utf8(response.data).unwrap());
    assert!(reply.starts_with("+OK"), "{}", reply);
    assert!(server.authenticated());
    assert_eq!(server.id(), "mrose");
}

#[test]
fn pop3_auth_command_end_to_end() {
    let server_store = SecretsFile::parse("server plain mrose tanstaaf\n", "server");
    let client_store = SecretsFile::parse("client plain mrose tanstaaf\n", "client");
    let mut server = Pop3Auth::new(&server_store, false, false, "", "relay.example.com");
    let mut client = SaslClient::new(&client_store, "");
    let mechanism = client.select_mechanism(&server.mechanisms(), "");
    assert_eq!(mechanism, "CRAM-SHA256");

    let mut reply = server.auth(&mechanism);
    loop {
        if let Some(challenge_b64) = reply.strip_prefix("+ ") {
            let challenge = BASE64.decode(challenge_b64.trim()).unwrap();
            let response = client.response(&mechanism, &challenge, "");
            assert!(!response.error);
            reply = server.respond(&BASE64.encode(&response.data));
        } else {
            break;
        }
    }
    assert!(reply.starts_with("+OK"), "{}", reply);
    assert_eq!(server.id(), "mrose");
}

#[test]
fn cram_response_matches_rfc2195_across_the_stack() {
    // the published example, pushed through the secrets store, the client
    // engine, and the server validator
    let server_store = SecretsFile::parse("server plain tim tanstaaftanstaaf\n", "server");
    let client_store = SecretsFile::parse("client plain tim tanstaaftanstaaf\n", "client");
    let challenge = "<1896.697170952@postoffice.reston.mci.net>";
    let mut client = SaslClient::new(&client_store, "");
    let response = client.response("CRAM-MD5", challenge.as_bytes(), "");
    assert_eq!(
        String::from_utf8_lossy(&response.data),
        "tim b913a602c7eda7a495b4e6e7334d3890"
    );
    let secret = server_store.server_secret("plain", "tim");
    assert!(Cram::validate(
        "MD5",
        true,
        &secret,
        challenge,
        &String::from_utf8_lossy(&response.data)
    ));
}
