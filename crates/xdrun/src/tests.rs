//! Tests for the Shadow façade with mock transports.

use std::sync::Arc;
use std::sync::Mutex;

use xdrpc::FailureReason;
use xdrpc::Handle;
use xdrpc::Kind;
use xdrpc::Message;
use xdrpc::Reply;
use xdrpc::TypeTag;
use xdrpc::Value;

use crate::config::Config;
use crate::config::TransportKind;
use crate::registry::ObjectKey;
use crate::shadow::Error;
use crate::shadow::Shadow;
use crate::transport;
use crate::transport::Transport;

/// Mock transport that records every message and answers round trips with a
/// fixed reply.
struct RecordingTransport {
    sent: Mutex<Vec<(Message, bool)>>,
    reply: Reply,
}

impl RecordingTransport {
    fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            reply,
        })
    }

    fn sent(&self) -> Vec<(Message, bool)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, message: &Message, one_way: bool) -> transport::Result<Option<Reply>> {
        self.sent.lock().unwrap().push((message.clone(), one_way));
        if one_way {
            Ok(None)
        } else {
            Ok(Some(self.reply.clone()))
        }
    }
}

/// Mock transport whose remote side is never reachable.
struct UnreachableTransport;

#[async_trait::async_trait]
impl Transport for UnreachableTransport {
    async fn send(&self, _message: &Message, _one_way: bool) -> transport::Result<Option<Reply>> {
        Err(transport::Error::Unavailable("ClosureRemote".into()))
    }
}

/// Mock transport that "succeeds" without ever producing a reply.
struct MuteTransport;

#[async_trait::async_trait]
impl Transport for MuteTransport {
    async fn send(&self, _message: &Message, _one_way: bool) -> transport::Result<Option<Reply>> {
        Ok(None)
    }
}

fn shadow_over(transport: Arc<dyn Transport>) -> Shadow {
    Shadow::builder(Config::default().with_enclave("orange"))
        .transport(transport)
        .build()
        .unwrap()
}

fn new_object() -> ObjectKey {
    ObjectKey::new(&Arc::new(()))
}

// ============================================================================
//  1. CONSTRUCT
// ============================================================================

#[tokio::test]
async fn test_construct_registers_and_sends_one_way() {
    let transport = RecordingTransport::new(Reply::Ok(Value::Null));
    let shadow = shadow_over(transport.clone());
    let obj = new_object();

    let handle = shadow
        .construct(&obj, "demo.Foo", vec![TypeTag::I32], vec![Value::I32(5)])
        .await;
    assert_eq!(handle, Some(Handle(1)));

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    let (message, one_way) = &sent[0];
    assert!(*one_way);
    assert_eq!(
        *message,
        Message::construct(Handle(1), "demo.Foo", vec![TypeTag::I32], vec![Value::I32(5)])
    );
}

#[tokio::test]
async fn test_construct_twice_sends_once() {
    let transport = RecordingTransport::new(Reply::Ok(Value::Null));
    let shadow = shadow_over(transport.clone());
    let obj = new_object();

    let first = shadow.construct(&obj, "demo.Foo", vec![], vec![]).await;
    let second = shadow.construct(&obj, "demo.Foo", vec![], vec![]).await;

    assert_eq!(first, second);
    assert_eq!(transport.sent().len(), 1);
    assert_eq!(shadow.registry().len(), 1);
}

#[tokio::test]
async fn test_construct_unavailable_degrades_to_none() {
    let shadow = shadow_over(Arc::new(UnreachableTransport));
    let obj = new_object();

    assert_eq!(shadow.construct(&obj, "demo.Foo", vec![], vec![]).await, None);
    assert!(shadow.registry().is_empty());

    match shadow.try_construct(&obj, "demo.Foo", vec![], vec![]).await {
        Err(Error::TransportUnavailable(name)) => assert_eq!(name, "ClosureRemote"),
        other => panic!("Expected TransportUnavailable, got {:?}", other),
    }
}

// ============================================================================
//  2. INVOKE & FIELDS
// ============================================================================

#[tokio::test]
async fn test_invoke_on_unregistered_object_sends_nothing() {
    let transport = RecordingTransport::new(Reply::Ok(Value::I32(1)));
    let shadow = shadow_over(transport.clone());
    let stranger = new_object();

    let res = shadow.try_invoke(Some(&stranger), "demo.Foo", "bar", vec![], vec![]).await;
    assert!(matches!(res, Err(Error::HandleNotFound { .. })));
    assert_eq!(shadow.invoke(Some(&stranger), "demo.Foo", "bar", vec![], vec![]).await, None);
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn test_invoke_uses_registered_handle_and_waits() {
    let transport = RecordingTransport::new(Reply::Ok(Value::Str("done".into())));
    let shadow = shadow_over(transport.clone());
    let obj = new_object();

    let handle = shadow.construct(&obj, "demo.Foo", vec![], vec![]).await.unwrap();
    let value = shadow
        .invoke(Some(&obj), "demo.Foo", "bar", vec![TypeTag::Bool], vec![Value::Bool(true)])
        .await;
    assert_eq!(value, Some(Value::Str("done".into())));

    let sent = transport.sent();
    let (message, one_way) = &sent[1];
    assert!(!*one_way);
    assert_eq!(message.kind(), Kind::Invoke);
    assert_eq!(message.handle(), handle);
}

#[tokio::test]
async fn test_static_invoke_uses_static_handle() {
    let transport = RecordingTransport::new(Reply::Ok(Value::I64(3)));
    let shadow = shadow_over(transport.clone());

    let value = shadow
        .invoke_static("demo.Math", "add", vec![TypeTag::I64, TypeTag::I64], vec![Value::I64(1), Value::I64(2)])
        .await;
    assert_eq!(value, Some(Value::I64(3)));
    assert_eq!(transport.sent()[0].0.handle(), Handle::STATIC);
    assert!(shadow.registry().is_empty());
}

#[tokio::test]
async fn test_remote_failure_is_kept_for_strict_callers() {
    let transport = RecordingTransport::new(Reply::Err(FailureReason::MemberNotFound));
    let shadow = shadow_over(transport.clone());
    let obj = new_object();
    shadow.construct(&obj, "demo.Foo", vec![], vec![]).await.unwrap();

    match shadow.try_read_field(&obj, "demo.Foo", "missing").await {
        Err(Error::Remote(FailureReason::MemberNotFound)) => {}
        other => panic!("Expected Remote(MemberNotFound), got {:?}", other),
    }
    assert_eq!(shadow.read_field(&obj, "demo.Foo", "missing").await, None);
}

#[tokio::test]
async fn test_field_write_is_one_way() {
    let transport = RecordingTransport::new(Reply::Ok(Value::Null));
    let shadow = shadow_over(transport.clone());
    let obj = new_object();
    let handle = shadow.construct(&obj, "demo.Foo", vec![], vec![]).await.unwrap();

    shadow.write_field(&obj, "demo.Foo", "x", Value::I32(42)).await;

    let sent = transport.sent();
    assert_eq!(sent[1], (Message::write_field(handle, "demo.Foo", "x", Value::I32(42)), true));
}

#[tokio::test]
async fn test_static_fields_need_no_registration() {
    let transport = RecordingTransport::new(Reply::Ok(Value::I32(7)));
    let shadow = shadow_over(transport.clone());

    shadow.write_static_field("demo.Foo", "COUNT", Value::I32(7)).await;
    assert_eq!(shadow.read_static_field("demo.Foo", "COUNT").await, Some(Value::I32(7)));

    let sent = transport.sent();
    assert_eq!(sent[0], (Message::write_static_field("demo.Foo", "COUNT", Value::I32(7)), true));
    assert_eq!(sent[1], (Message::read_static_field("demo.Foo", "COUNT"), false));
}

#[tokio::test]
async fn test_missing_reply_is_transport_error() {
    let shadow = shadow_over(Arc::new(MuteTransport));
    let res = shadow.try_read_static_field("demo.Foo", "COUNT").await;
    assert!(matches!(res, Err(Error::Transport(transport::Error::ConnectionLost(_)))));
}

#[tokio::test]
async fn test_malformed_invoke_is_rejected_before_io() {
    let transport = RecordingTransport::new(Reply::Ok(Value::I32(1)));
    let shadow = shadow_over(transport.clone());
    let obj = new_object();
    shadow.construct(&obj, "demo.Foo", vec![], vec![]).await.unwrap();

    // One declared parameter, no argument.
    let res = shadow.try_invoke(Some(&obj), "demo.Foo", "bar", vec![TypeTag::I32], vec![]).await;
    assert!(matches!(res, Err(Error::Rpc(xdrpc::Error::ProtocolViolation(_)))));
    assert_eq!(shadow.invoke(Some(&obj), "demo.Foo", "bar", vec![TypeTag::I32], vec![]).await, None);

    // Only the construct went out.
    assert_eq!(transport.sent().len(), 1);
}

#[tokio::test]
async fn test_malformed_construct_leaves_no_registration() {
    let transport = RecordingTransport::new(Reply::Ok(Value::Null));
    let shadow = shadow_over(transport.clone());
    let obj = new_object();

    let res = shadow.try_construct(&obj, "demo.Foo", vec![], vec![Value::I32(1)]).await;
    assert!(matches!(res, Err(Error::Rpc(_))));
    assert!(shadow.registry().is_empty());
    assert!(transport.sent().is_empty());
}

// ============================================================================
//  3. POLICY
// ============================================================================

#[tokio::test]
async fn test_policy_denial_happens_before_io() {
    let transport = RecordingTransport::new(Reply::Ok(Value::Null));
    let deny_invoke = |op: Kind, _: &Message| op != Kind::Invoke;
    let shadow = Shadow::builder(Config::default())
        .transport(transport.clone())
        .policy(Arc::new(deny_invoke))
        .build()
        .unwrap();
    let obj = new_object();

    shadow.construct(&obj, "demo.Foo", vec![], vec![]).await.unwrap();
    let res = shadow.try_invoke(Some(&obj), "demo.Foo", "bar", vec![], vec![]).await;

    match res {
        Err(Error::PermissionDenied { operation, class_name }) => {
            assert_eq!(operation, Kind::Invoke);
            assert_eq!(class_name, "demo.Foo");
        }
        other => panic!("Expected PermissionDenied, got {:?}", other),
    }
    // Only the construct went out.
    assert_eq!(transport.sent().len(), 1);
}

#[tokio::test]
async fn test_denied_construct_leaves_no_registration() {
    let transport = RecordingTransport::new(Reply::Ok(Value::Null));
    let shadow = Shadow::builder(Config::default())
        .transport(transport.clone())
        .policy(Arc::new(|op: Kind, m: &Message| !(op == Kind::Construct && m.class_name() == "secret.Vault")))
        .build()
        .unwrap();

    let vault = new_object();
    assert_eq!(shadow.construct(&vault, "secret.Vault", vec![], vec![]).await, None);
    assert!(shadow.registry().is_empty());
    assert!(transport.sent().is_empty());

    let foo = new_object();
    assert!(shadow.construct(&foo, "demo.Foo", vec![], vec![]).await.is_some());
}

// ============================================================================
//  4. FINALIZE
// ============================================================================

#[tokio::test]
async fn test_finalize_sends_and_unregisters() {
    let transport = RecordingTransport::new(Reply::Ok(Value::Null));
    let shadow = shadow_over(transport.clone());
    let obj = new_object();
    let handle = shadow.construct(&obj, "demo.Foo", vec![], vec![]).await.unwrap();

    shadow.finalize(&obj, "demo.Foo").await;

    assert!(shadow.registry().is_empty());
    assert_eq!(transport.sent()[1], (Message::finalize(handle, "demo.Foo"), true));
}

#[tokio::test]
async fn test_finalize_unregisters_even_when_unreachable() {
    let registry = Arc::new(crate::registry::ClientRegistry::new());
    let obj = new_object();
    registry.register("demo.Foo", &obj).unwrap();

    let shadow = Shadow::builder(Config::default())
        .transport(Arc::new(UnreachableTransport))
        .registry(registry.clone())
        .build()
        .unwrap();

    assert!(matches!(
        shadow.try_finalize(&obj, "demo.Foo").await,
        Err(Error::TransportUnavailable(_))
    ));
    assert!(registry.is_empty());
}

// ============================================================================
//  5. BUILDER
// ============================================================================

#[test]
fn test_soft_failures_are_told_apart() {
    assert!(Error::HandleNotFound { class_name: "demo.Foo".into() }.is_soft());
    assert!(Error::Remote(FailureReason::MemberNotFound).is_soft());
    assert!(Error::PermissionDenied { operation: Kind::Invoke, class_name: "demo.Foo".into() }.is_soft());

    assert!(!Error::TransportUnavailable("ClosureRemote".into()).is_soft());
    assert!(!Error::HandlesExhausted.is_soft());
    assert!(!Error::Misconfigured("no fabric".into()).is_soft());
}

#[test]
fn test_builder_requires_collaborators() {
    let direct = Shadow::builder(Config::default().with_transport(TransportKind::Direct)).build();
    assert!(matches!(direct, Err(Error::Misconfigured(_))));

    let correlated = Shadow::builder(Config::default()).build();
    assert!(matches!(correlated, Err(Error::Misconfigured(_))));
}
