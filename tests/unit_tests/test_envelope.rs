// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use prost::Message;
use valorant_bridge_rs::proto::messages::{
    ClientHeartbeat, ClientRegister, Envelope, Payload, ResolveAccountResponse,
};

// Wire-compat fixtures: these byte sequences pin the envelope's field
// numbering. If an edit to the message definitions breaks one of these, the
// protocol changed.

#[test]
fn test_register_field_numbers_stable() -> Result<()> {
    let env = Envelope {
        id: "7".to_string(),
        payload: Some(Payload::ClientRegister(ClientRegister {
            client_id: "w1".to_string(),
            version: "dev".to_string(),
        })),
    };

    let expected: &[u8] = &[
        0x0a, 0x01, b'7', // id = "7"
        0x12, 0x09, // oneof field 2, 9 bytes
        0x0a, 0x02, b'w', b'1', // client_id = "w1"
        0x12, 0x03, b'd', b'e', b'v', // version = "dev"
    ];

    assert_eq!(env.encode_to_vec(), expected);
    assert_eq!(Envelope::decode(expected)?, env);
    Ok(())
}

#[test]
fn test_heartbeat_field_numbers_stable() -> Result<()> {
    let env = Envelope {
        id: "0".to_string(),
        payload: Some(Payload::ClientHeartbeat(ClientHeartbeat {
            timestamp_ms: 1,
            lcu_available: true,
        })),
    };

    let expected: &[u8] = &[
        0x0a, 0x01, b'0', // id = "0"
        0x1a, 0x04, // oneof field 3, 4 bytes
        0x08, 0x01, // timestamp_ms = 1
        0x10, 0x01, // lcu_available = true
    ];

    assert_eq!(env.encode_to_vec(), expected);
    assert_eq!(Envelope::decode(expected)?, env);
    Ok(())
}

#[test]
fn test_response_round_trip() -> Result<()> {
    let env = Envelope::resolve_response("req-9".to_string(), ResolveAccountResponse {
        puuid: "P3".to_string(),
        region: "na1".to_string(),
        account_level: 7,
        card: "C".to_string(),
        title: "T".to_string(),
    });

    let decoded = Envelope::decode(env.encode_to_vec().as_slice())?;
    assert_eq!(decoded, env);

    let Some(Payload::ResolveAccountResponse(resp)) = decoded.payload else {
        panic!("wrong payload variant");
    };
    assert_eq!(resp.puuid, "P3");
    assert_eq!(resp.account_level, 7);
    Ok(())
}

#[test]
fn test_unknown_fields_are_skipped() -> Result<()> {
    // A peer speaking a newer schema may append fields; decoding must not
    // choke on them.
    let mut bytes = Envelope::register("w1", "dev").encode_to_vec();
    bytes.extend_from_slice(&[0x9a, 0x06, 0x03, b'x', b'y', b'z']); // field 99, "xyz"

    let decoded = Envelope::decode(bytes.as_slice())?;
    let Some(Payload::ClientRegister(reg)) = decoded.payload else {
        panic!("wrong payload variant");
    };
    assert_eq!(reg.client_id, "w1");
    Ok(())
}

#[test]
fn test_error_response_round_trip() -> Result<()> {
    let env = Envelope::error("req-1".to_string(), "RESOLVE_FAILED", "boom".to_string());

    let decoded = Envelope::decode(env.encode_to_vec().as_slice())?;
    let Some(Payload::ErrorResponse(err)) = decoded.payload else {
        panic!("wrong payload variant");
    };
    assert_eq!(err.code, "RESOLVE_FAILED");
    assert_eq!(err.message, "boom");
    Ok(())
}
