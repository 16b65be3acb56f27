//! End-to-end tests for the RADIUS gateway
//!
//! Each test binds a gateway on 127.0.0.1 with OS-assigned ports and talks
//! to it over UDP:
//! - Loopback answers and Proxy-State echo
//! - Duplicate request suppression
//! - Accounting relay and request authenticator checks
//! - EAP conversations and Message-Authenticator enforcement
//! - CoA routing to the NAS that reported the session
//! - Canary tier assignment

use async_trait::async_trait;
use radius_gateway::backend::{AccountingContext, AuthRequest, AuthResponse};
use radius_gateway::config::{CanaryConfig, ListenerConfig, ModuleConfig};
use radius_gateway::{
    AccountingService, Authenticator, BackendError, ConfigError, GatewayConfig, GatewayContext,
    RadiusServer, ServerError, SessionStore, StaticLoader,
};
use radius_proto::eap::{add_eap_to_radius_packet, eap_from_radius_packet};
use radius_proto::mppe::MICROSOFT_VENDOR_ID;
use radius_proto::{
    AcctTerminateCause, Attribute, AttributeType, Code, EapCode, EapPacket, EapType, Packet,
    UsageCounters, finalize_request, finalize_response, generate_request_authenticator,
    verify_packet_message_authenticator, verify_response_authenticator,
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

const SECRET: &[u8] = b"testing123";

fn listener(name: &str, modules: Vec<ModuleConfig>) -> ListenerConfig {
    ListenerConfig {
        name: name.to_string(),
        address: "127.0.0.1:0".to_string(),
        secret: None,
        modules,
    }
}

fn config(listeners: Vec<ListenerConfig>) -> GatewayConfig {
    GatewayConfig {
        secret: "testing123".to_string(),
        listeners,
        ..GatewayConfig::default()
    }
}

/// Build the gateway and serve it in the background
async fn start(config: GatewayConfig, context: GatewayContext) -> Arc<RadiusServer> {
    let server = Arc::new(
        RadiusServer::new(config, &StaticLoader, context)
            .await
            .expect("Failed to create gateway"),
    );
    let running = Arc::clone(&server);
    tokio::spawn(async move {
        running.run().await.expect("Gateway failed");
    });
    server
}

/// Send one datagram and wait for the answer, `None` on silence
async fn send_and_receive(
    socket: &UdpSocket,
    bytes: &[u8],
    target: SocketAddr,
    wait: Duration,
) -> Option<Packet> {
    socket.send_to(bytes, target).await.unwrap();
    let mut buf = [0u8; 4096];
    match timeout(wait, socket.recv_from(&mut buf)).await {
        Ok(Ok((len, _))) => Some(Packet::decode(&buf[..len]).unwrap()),
        _ => None,
    }
}

async fn client_socket() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

fn string_attr(attr_type: AttributeType, value: &str) -> Attribute {
    Attribute::string(attr_type.as_u8(), value).unwrap()
}

fn integer_attr(attr_type: AttributeType, value: u32) -> Attribute {
    Attribute::integer(attr_type.as_u8(), value).unwrap()
}

fn strings(packet: &Packet, attr_type: AttributeType) -> Vec<String> {
    packet
        .find_all_attributes(attr_type.as_u8())
        .into_iter()
        .map(|a| a.as_string().unwrap())
        .collect()
}

#[derive(Default)]
struct RecordingService {
    events: Mutex<Vec<(&'static str, AccountingContext)>>,
}

#[async_trait]
impl AccountingService for RecordingService {
    async fn start(&self, ctx: &AccountingContext) -> Result<(), BackendError> {
        self.events.lock().unwrap().push(("start", ctx.clone()));
        Ok(())
    }

    async fn interim_update(
        &self,
        ctx: &AccountingContext,
        _usage: &UsageCounters,
    ) -> Result<(), BackendError> {
        self.events.lock().unwrap().push(("interim", ctx.clone()));
        Ok(())
    }

    async fn stop(
        &self,
        ctx: &AccountingContext,
        _cause: AcctTerminateCause,
        _usage: &UsageCounters,
    ) -> Result<(), BackendError> {
        self.events.lock().unwrap().push(("stop", ctx.clone()));
        Ok(())
    }
}

/// Challenges the identity once, then succeeds
struct TwoStepAuthenticator;

#[async_trait]
impl Authenticator for TwoStepAuthenticator {
    async fn handle_identity(&self, request: AuthRequest) -> Result<AuthResponse, BackendError> {
        let identifier = EapPacket::from_bytes(&request.payload).unwrap().identifier;
        Ok(AuthResponse {
            payload: EapPacket::new(
                EapCode::Request,
                identifier.wrapping_add(1),
                Some(EapType::Aka),
                vec![1, 0, 0],
            )
            .to_bytes(),
            backend_context: "challenge-sent".to_string(),
            ..AuthResponse::default()
        })
    }

    async fn handle(&self, request: AuthRequest) -> Result<AuthResponse, BackendError> {
        if request.backend_context != "challenge-sent" {
            return Err(BackendError::Rejected("unexpected context".to_string()));
        }
        let identifier = EapPacket::from_bytes(&request.payload).unwrap().identifier;
        Ok(AuthResponse {
            payload: EapPacket::success(identifier).to_bytes(),
            backend_context: String::new(),
            msk: vec![0x5a; 64],
            identity: "0001010000000001@wlan".to_string(),
            msisdn: "15550001".to_string(),
        })
    }
}

/// Access-Request carrying an EAP packet and a signed Message-Authenticator
fn eap_request(identifier: u8, eap: &EapPacket, sign: bool) -> (Vec<u8>, [u8; 16]) {
    let authenticator = generate_request_authenticator();
    let mut packet = Packet::new(Code::AccessRequest, identifier, authenticator);
    packet.add_attribute(string_attr(AttributeType::CallingStationId, "aa-bb-cc-dd-ee-ff"));
    packet.add_attribute(string_attr(AttributeType::CalledStationId, "wlan.carrier"));
    add_eap_to_radius_packet(&mut packet, eap).unwrap();
    if sign {
        packet.add_attribute(
            Attribute::new(AttributeType::MessageAuthenticator.as_u8(), vec![0u8; 16]).unwrap(),
        );
    }
    (finalize_request(&mut packet, SECRET).unwrap(), authenticator)
}

#[tokio::test]
async fn test_loopback_answers_and_echoes_proxy_state() {
    let server = start(
        config(vec![listener("auth", vec![ModuleConfig::new("loopback", Value::Null)])]),
        GatewayContext::new(SessionStore::in_memory()),
    )
    .await;
    let addr = server.local_addr("auth").unwrap();

    let authenticator = generate_request_authenticator();
    let mut request = Packet::new(Code::AccessRequest, 5, authenticator);
    request.add_attribute(string_attr(AttributeType::UserName, "alice"));
    request.add_attribute(string_attr(AttributeType::ProxyState, "state-1"));
    request.add_attribute(string_attr(AttributeType::ProxyState, "state-2"));
    let bytes = finalize_request(&mut request, SECRET).unwrap();

    let socket = client_socket().await;
    let response = send_and_receive(&socket, &bytes, addr, Duration::from_secs(2))
        .await
        .expect("No response from gateway");

    assert_eq!(response.code, Code::AccessAccept);
    assert_eq!(response.identifier, 5);
    assert!(verify_response_authenticator(&response, &authenticator, SECRET));
    assert_eq!(strings(&response, AttributeType::UserName), vec!["alice"]);
    assert_eq!(
        strings(&response, AttributeType::ProxyState),
        vec!["state-1", "state-2"]
    );
}

#[tokio::test]
async fn test_duplicate_request_dropped() {
    let server = start(
        config(vec![listener("auth", vec![ModuleConfig::new("loopback", Value::Null)])]),
        GatewayContext::new(SessionStore::in_memory()),
    )
    .await;
    let addr = server.local_addr("auth").unwrap();
    let socket = client_socket().await;

    let mut request = Packet::new(Code::AccessRequest, 9, generate_request_authenticator());
    let bytes = finalize_request(&mut request, SECRET).unwrap();

    let first = send_and_receive(&socket, &bytes, addr, Duration::from_secs(2)).await;
    assert!(first.is_some());

    let retransmit = send_and_receive(&socket, &bytes, addr, Duration::from_millis(300)).await;
    assert!(retransmit.is_none());
    assert_eq!(server.dropped_count(), 1);

    let mut next = Packet::new(Code::AccessRequest, 10, generate_request_authenticator());
    let bytes = finalize_request(&mut next, SECRET).unwrap();
    let answer = send_and_receive(&socket, &bytes, addr, Duration::from_secs(2)).await;
    assert_eq!(answer.map(|p| p.identifier), Some(10));
}

#[tokio::test]
async fn test_accounting_start_reaches_service() {
    let service = Arc::new(RecordingService::default());
    let context = GatewayContext::new(SessionStore::in_memory())
        .with_accounting_service("accounting", service.clone());
    let server = start(
        config(vec![listener(
            "acct",
            vec![ModuleConfig::new("accounting", json!({ "TimeoutMs": 1000 }))],
        )]),
        context,
    )
    .await;
    let addr = server.local_addr("acct").unwrap();

    let mut request = Packet::new(Code::AccountingRequest, 1, [0u8; 16]);
    request.add_attribute(integer_attr(AttributeType::AcctStatusType, 1));
    request.add_attribute(string_attr(AttributeType::AcctSessionId, "acct-1"));
    request.add_attribute(string_attr(AttributeType::CallingStationId, "aa-bb"));
    request.add_attribute(string_attr(AttributeType::CalledStationId, "wlan.carrier"));
    let bytes = finalize_request(&mut request, SECRET).unwrap();

    let socket = client_socket().await;
    let response = send_and_receive(&socket, &bytes, addr, Duration::from_secs(2))
        .await
        .expect("No accounting response");

    assert_eq!(response.code, Code::AccountingResponse);
    assert!(verify_response_authenticator(&response, &request.authenticator, SECRET));

    let events = service.events.lock().unwrap().clone();
    assert_eq!(events.len(), 1);
    let (event, ctx) = &events[0];
    assert_eq!(*event, "start");
    assert_eq!(ctx.session_id, "acct-1");
    assert_eq!(ctx.acct_session_id, "acct-1");
    assert_eq!(ctx.mac_addr, "aa-bb");
    assert_eq!(ctx.apn, "wlan.carrier");
    assert_eq!(ctx.nas_ip.to_string(), "127.0.0.1");
}

#[tokio::test]
async fn test_accounting_with_wrong_secret_dropped() {
    let service = Arc::new(RecordingService::default());
    let context = GatewayContext::new(SessionStore::in_memory())
        .with_accounting_service("accounting", service.clone());
    let server = start(
        config(vec![listener("acct", vec![ModuleConfig::new("accounting", Value::Null)])]),
        context,
    )
    .await;
    let addr = server.local_addr("acct").unwrap();

    let mut request = Packet::new(Code::AccountingRequest, 1, [0u8; 16]);
    request.add_attribute(integer_attr(AttributeType::AcctStatusType, 1));
    request.add_attribute(string_attr(AttributeType::AcctSessionId, "acct-2"));
    let bytes = finalize_request(&mut request, b"not-the-secret").unwrap();

    let socket = client_socket().await;
    let response = send_and_receive(&socket, &bytes, addr, Duration::from_millis(300)).await;
    assert!(response.is_none());
    assert!(service.events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_eap_conversation_completes() {
    let sessions = SessionStore::in_memory();
    let context = GatewayContext::new(sessions.clone())
        .with_authenticator("aka", Arc::new(TwoStepAuthenticator));
    let server = start(
        config(vec![listener("auth", vec![ModuleConfig::new("eap", json!({ "Method": "aka" }))])]),
        context,
    )
    .await;
    let addr = server.local_addr("auth").unwrap();
    let socket = client_socket().await;

    let identity = EapPacket::identity_response(1, "0001@wlan");
    let (bytes, authenticator) = eap_request(1, &identity, true);
    let challenge = send_and_receive(&socket, &bytes, addr, Duration::from_secs(2))
        .await
        .expect("No challenge from gateway");

    assert_eq!(challenge.code, Code::AccessChallenge);
    assert!(verify_response_authenticator(&challenge, &authenticator, SECRET));
    assert!(verify_packet_message_authenticator(&challenge, SECRET, &authenticator));
    let eap = eap_from_radius_packet(&challenge).unwrap().unwrap();
    assert_eq!(eap.code, EapCode::Request);
    assert_eq!(eap.eap_type(), Some(EapType::Aka));

    let answer = EapPacket::new(EapCode::Response, eap.identifier, Some(EapType::Aka), vec![2, 0, 0]);
    let (bytes, authenticator) = eap_request(2, &answer, true);
    let accept = send_and_receive(&socket, &bytes, addr, Duration::from_secs(2))
        .await
        .expect("No accept from gateway");

    assert_eq!(accept.code, Code::AccessAccept);
    assert!(verify_packet_message_authenticator(&accept, SECRET, &authenticator));
    assert_eq!(
        eap_from_radius_packet(&accept).unwrap().unwrap().code,
        EapCode::Success
    );
    let mppe_keys = accept
        .find_all_attributes(AttributeType::VendorSpecific.as_u8())
        .into_iter()
        .filter_map(|a| a.as_vendor_specific().ok())
        .filter(|vsa| vsa.vendor_id == MICROSOFT_VENDOR_ID)
        .count();
    assert_eq!(mppe_keys, 2);
    assert_eq!(
        strings(&accept, AttributeType::UserName),
        vec!["0001010000000001@wlan"]
    );

    let state = sessions
        .session("aa-bb-cc-dd-ee-ff/wlan.carrier")
        .get()
        .await
        .unwrap();
    assert_eq!(state.msisdn, "15550001");
}

#[tokio::test]
async fn test_eap_without_message_authenticator_dropped() {
    let context = GatewayContext::new(SessionStore::in_memory())
        .with_authenticator("aka", Arc::new(TwoStepAuthenticator));
    let server = start(
        config(vec![listener("auth", vec![ModuleConfig::new("eap", Value::Null)])]),
        context,
    )
    .await;
    let addr = server.local_addr("auth").unwrap();

    let (bytes, _) = eap_request(1, &EapPacket::identity_response(1, "0001@wlan"), false);
    let socket = client_socket().await;
    let response = send_and_receive(&socket, &bytes, addr, Duration::from_millis(300)).await;
    assert!(response.is_none());
}

/// NAS stand-in acknowledging CoA requests; received requests are forwarded
async fn spawn_nas() -> (u16, tokio::sync::mpsc::UnboundedReceiver<Packet>) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        while let Ok((len, from)) = socket.recv_from(&mut buf).await {
            let request = Packet::decode(&buf[..len]).unwrap();
            let mut ack = Packet::new(Code::CoaAck, request.identifier, [0u8; 16]);
            let bytes = finalize_response(&mut ack, &request.authenticator, SECRET).unwrap();
            let _ = tx.send(request);
            socket.send_to(&bytes, from).await.unwrap();
        }
    });
    (port, rx)
}

#[tokio::test]
async fn test_coa_routed_to_reporting_nas() {
    let (nas_port, mut nas_requests) = spawn_nas().await;
    let coa_module = || ModuleConfig::new("coa_dynamic", json!({ "Port": nas_port, "TimeoutMs": 1000 }));
    let server = start(
        config(vec![
            listener("acct", vec![coa_module(), ModuleConfig::new("loopback", Value::Null)]),
            listener("coa", vec![coa_module()]),
        ]),
        GatewayContext::new(SessionStore::in_memory()),
    )
    .await;

    let mut interim = Packet::new(Code::AccountingRequest, 3, [0u8; 16]);
    interim.add_attribute(integer_attr(AttributeType::AcctStatusType, 3));
    interim.add_attribute(string_attr(AttributeType::AcctSessionId, "sess-9"));
    let bytes = finalize_request(&mut interim, SECRET).unwrap();
    let nas = client_socket().await;
    let response = send_and_receive(&nas, &bytes, server.local_addr("acct").unwrap(), Duration::from_secs(2))
        .await
        .expect("No accounting response");
    assert_eq!(response.code, Code::AccountingResponse);

    let mut coa = Packet::new(Code::CoaRequest, 4, [0u8; 16]);
    coa.add_attribute(string_attr(AttributeType::AcctSessionId, "sess-9"));
    coa.add_attribute(string_attr(AttributeType::Class, "premium"));
    let bytes = finalize_request(&mut coa, SECRET).unwrap();
    let aaa = client_socket().await;
    let ack = send_and_receive(&aaa, &bytes, server.local_addr("coa").unwrap(), Duration::from_secs(2))
        .await
        .expect("No CoA answer");

    assert_eq!(ack.code, Code::CoaAck);
    assert!(verify_response_authenticator(&ack, &coa.authenticator, SECRET));

    let relayed = nas_requests.recv().await.unwrap();
    assert_eq!(relayed.code, Code::CoaRequest);
    assert_eq!(strings(&relayed, AttributeType::Class), vec!["premium"]);
}

#[tokio::test]
async fn test_coa_for_unknown_session_dropped() {
    let (nas_port, _nas_requests) = spawn_nas().await;
    let server = start(
        config(vec![listener(
            "coa",
            vec![ModuleConfig::new("coa_dynamic", json!({ "Port": nas_port }))],
        )]),
        GatewayContext::new(SessionStore::in_memory()),
    )
    .await;

    let mut coa = Packet::new(Code::DisconnectRequest, 4, [0u8; 16]);
    coa.add_attribute(string_attr(AttributeType::AcctSessionId, "never-seen"));
    let bytes = finalize_request(&mut coa, SECRET).unwrap();
    let socket = client_socket().await;
    let response = send_and_receive(
        &socket,
        &bytes,
        server.local_addr("coa").unwrap(),
        Duration::from_millis(300),
    )
    .await;
    assert!(response.is_none());
}

#[tokio::test]
async fn test_canary_filter_pins_tier() {
    let sessions = SessionStore::in_memory();
    let mut gateway_config = config(vec![listener(
        "auth",
        vec![ModuleConfig::new("loopback", Value::Null)],
    )]);
    gateway_config.filters = vec!["lb_canary".to_string()];
    gateway_config.load_balance.canaries = vec![CanaryConfig {
        name: "canary".to_string(),
        weight: 50,
    }];
    let server = start(gateway_config, GatewayContext::new(sessions.clone())).await;
    let addr = server.local_addr("auth").unwrap();
    let socket = client_socket().await;

    let mut tiers = Vec::new();
    for identifier in 0..3 {
        let mut request = Packet::new(Code::AccessRequest, identifier, generate_request_authenticator());
        request.add_attribute(string_attr(AttributeType::CallingStationId, "mac-1"));
        request.add_attribute(string_attr(AttributeType::CalledStationId, "ssid"));
        let bytes = finalize_request(&mut request, SECRET).unwrap();
        assert!(send_and_receive(&socket, &bytes, addr, Duration::from_secs(2)).await.is_some());

        let state = sessions.session("mac-1/ssid").get().await.unwrap();
        tiers.push(state.tier.expect("Tier not assigned"));
    }

    assert!(tiers[0] == "canary" || tiers[0] == "live");
    assert!(tiers.iter().all(|tier| *tier == tiers[0]));
}

#[tokio::test]
async fn test_startup_fails_without_accounting_service() {
    let result = RadiusServer::new(
        config(vec![listener("acct", vec![ModuleConfig::new("accounting", Value::Null)])]),
        &StaticLoader,
        GatewayContext::new(SessionStore::in_memory()),
    )
    .await;
    assert!(matches!(
        result,
        Err(ServerError::Config(ConfigError::Module { .. }))
    ));
}

#[tokio::test]
async fn test_startup_fails_on_unknown_module() {
    let result = RadiusServer::new(
        config(vec![listener("auth", vec![ModuleConfig::new("ldap", Value::Null)])]),
        &StaticLoader,
        GatewayContext::new(SessionStore::in_memory()),
    )
    .await;
    assert!(matches!(
        result,
        Err(ServerError::Config(ConfigError::UnknownModule(name))) if name == "ldap"
    ));
}
