//! Call dispatch tests: ordering, buffering, terminal drops, eventing,
//! capabilities, and observability.

mod common;

use common::{probed_options, sync_collaborators, wait_until, CallbackProbe, BUNDLE};
use hearth_engine::testing::{RecordingSink, ScriptedHolder, StaticLoader};
use hearth_engine::{events, CapabilityProvider, EngineError, Script};
use hearth_host::{CapabilitySpec, Collaborators, HostError, LifecycleState, ScriptInstance};
use serde_json::{json, Value};
use std::sync::Arc;

#[tokio::test]
async fn loaded_instance_dispatches_immediately() {
    let (holder, collaborators) = sync_collaborators();
    let instance = ScriptInstance::new(probed_options(&CallbackProbe::new()), collaborators);
    instance.initialize();
    instance.when_loaded().wait().await.unwrap();

    instance.call_function("App", "run", vec![json!({"fast": true})]);

    let engine = holder.engine();
    assert!(wait_until(|| engine.call_count() == 1).await);
    let calls = engine.calls();
    assert_eq!(calls[0].module, "App");
    assert_eq!(calls[0].method, "run");
    assert_eq!(calls[0].args, vec![json!({"fast": true})]);
}

#[tokio::test]
async fn order_is_preserved_across_the_load_transition() {
    let (holder, collaborators) = sync_collaborators();
    let instance = ScriptInstance::new(probed_options(&CallbackProbe::new()), collaborators);

    instance.call_function("App", "before", vec![]);
    instance.initialize();
    instance.when_loaded().wait().await.unwrap();
    instance.call_function("App", "after", vec![]);

    let engine = holder.engine();
    assert!(wait_until(|| engine.call_count() == 2).await);
    let methods: Vec<_> = engine.calls().into_iter().map(|c| c.method).collect();
    assert_eq!(methods, vec!["before", "after"]);
}

#[tokio::test]
async fn calls_after_destroy_never_dispatch() {
    let (holder, collaborators) = sync_collaborators();
    let instance = ScriptInstance::new(probed_options(&CallbackProbe::new()), collaborators);
    instance.initialize();
    instance.when_loaded().wait().await.unwrap();
    instance.destroy().wait().await.unwrap();

    for i in 0..5 {
        instance.call_function("App", "late", vec![json!(i)]);
    }
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    assert_eq!(holder.engine().call_count(), 0);
    assert_eq!(instance.current_state(), LifecycleState::Unloaded);
}

#[tokio::test]
async fn calls_after_error_never_dispatch() {
    let probe = CallbackProbe::new();
    let holder = ScriptedHolder::succeeding();
    let loader = StaticLoader::failing(EngineError::LoadFailed("gone".into()));
    let collaborators = Collaborators::new(holder.clone(), loader);

    let instance = ScriptInstance::new(probed_options(&probe), collaborators);
    instance.initialize();
    assert!(instance.when_loaded().wait().await.is_err());

    for _ in 0..3 {
        instance.call_function("App", "late", vec![]);
    }
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    assert_eq!(holder.engine().call_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn per_issuer_order_is_preserved_under_concurrency() {
    let (holder, collaborators) = sync_collaborators();
    let instance = Arc::new(ScriptInstance::new(
        probed_options(&CallbackProbe::new()),
        collaborators,
    ));
    instance.initialize();
    instance.when_loaded().wait().await.unwrap();

    let issuers: Vec<_> = ["alpha", "beta"]
        .into_iter()
        .map(|name| {
            let instance = Arc::clone(&instance);
            tokio::spawn(async move {
                for i in 0..10 {
                    instance.call_function(name, &format!("step{i}"), vec![json!(i)]);
                }
            })
        })
        .collect();
    for issuer in issuers {
        issuer.await.unwrap();
    }

    let engine = holder.engine();
    assert!(wait_until(|| engine.call_count() == 20).await);

    // Interleaving between issuers is free; order within each issuer
    // is the contract.
    for name in ["alpha", "beta"] {
        let steps: Vec<_> = engine
            .calls()
            .into_iter()
            .filter(|c| c.module == name)
            .map(|c| c.method)
            .collect();
        let expected: Vec<_> = (0..10).map(|i| format!("step{i}")).collect();
        assert_eq!(steps, expected, "issuer {name}");
    }
}

#[tokio::test]
async fn dispatch_event_routes_through_the_emitter_path() {
    let (holder, collaborators) = sync_collaborators();
    let instance = ScriptInstance::new(probed_options(&CallbackProbe::new()), collaborators);
    instance.initialize();
    instance.when_loaded().wait().await.unwrap();

    instance.dispatch_event(42, "press", json!({"x": 10}));

    let engine = holder.engine();
    assert!(wait_until(|| engine.call_count() == 1).await);
    let calls = engine.calls();
    assert_eq!(calls[0].module, "EventEmitter");
    assert_eq!(calls[0].method, "receiveEvent");
    assert_eq!(calls[0].args, vec![json!(42), json!("press"), json!({"x": 10})]);
}

#[tokio::test]
async fn events_buffered_before_load_keep_their_slot() {
    let (holder, collaborators) = sync_collaborators();
    let instance = ScriptInstance::new(probed_options(&CallbackProbe::new()), collaborators);

    instance.call_function("App", "first", vec![]);
    instance.dispatch_event(7, "ready", Value::Null);
    instance.call_function("App", "last", vec![]);

    instance.initialize();
    instance.when_loaded().wait().await.unwrap();

    let engine = holder.engine();
    assert!(wait_until(|| engine.call_count() == 3).await);
    let methods: Vec<_> = engine.calls().into_iter().map(|c| c.method).collect();
    assert_eq!(methods, vec!["first", "receiveEvent", "last"]);
}

#[tokio::test]
async fn fast_refresh_setup_is_buffered_and_replayed() {
    let probe = CallbackProbe::new();
    let (holder, collaborators) = sync_collaborators();

    let mut options = probed_options(&probe);
    options.use_fast_refresh = true;
    options.debugger_port = 8081;
    let instance = ScriptInstance::new(options, collaborators);
    instance.initialize();
    instance.when_loaded().wait().await.unwrap();

    let engine = holder.engine();
    assert!(wait_until(|| engine.call_count() == 1).await);

    let calls = engine.calls();
    assert_eq!(calls[0].module, "FastRefresh");
    assert_eq!(calls[0].method, "setup");
    assert_eq!(
        calls[0].args,
        vec![json!(BUNDLE), json!(8081), json!(true)]
    );
    assert_eq!(engine.loaded_scripts(), vec![BUNDLE.to_string()]);
}

#[tokio::test]
async fn non_fatal_call_error_reports_without_state_change() {
    let probe = CallbackProbe::new();
    let (holder, collaborators) = sync_collaborators();
    let instance = ScriptInstance::new(probed_options(&probe), collaborators);
    instance.initialize();
    instance.when_loaded().wait().await.unwrap();

    let engine = holder.engine();
    engine.fail_next_calls(true);
    instance.call_function("App", "wobbly", vec![]);

    assert!(wait_until(|| probe.error_count() == 1).await);
    assert_eq!(instance.current_state(), LifecycleState::Loaded);
    assert!(matches!(
        probe.errors.lock().unwrap()[0],
        HostError::RuntimeCall { fatal: false, .. }
    ));

    // The instance keeps serving.
    engine.fail_next_calls(false);
    instance.call_function("App", "steady", vec![]);
    assert!(wait_until(|| engine.call_count() == 1).await);
}

#[tokio::test]
async fn capabilities_install_on_bootstrap_and_clear_on_destroy() {
    struct Clock;
    impl CapabilityProvider for Clock {
        fn invoke(&self, _method: &str, _args: &[Value]) -> Result<Value, EngineError> {
            Ok(json!(12345))
        }
    }

    let (_holder, collaborators) = sync_collaborators();
    let collaborators = collaborators
        .with_capability(CapabilitySpec::new("Clock", Arc::new(Clock), false))
        .with_capability(CapabilitySpec::new("Storage", Arc::new(Clock), true));

    let instance = ScriptInstance::new(probed_options(&CallbackProbe::new()), collaborators);
    instance.initialize();
    instance.when_loaded().wait().await.unwrap();

    let clock = instance.capabilities().resolve("Clock").unwrap();
    assert_eq!(clock.invoke("now", &[]).unwrap(), json!(12345));
    assert_eq!(instance.capabilities().is_async_only("Storage"), Some(true));
    assert!(instance.capabilities().resolve("Missing").is_none());

    instance.destroy().wait().await.unwrap();
    assert!(instance.capabilities().resolve("Clock").is_none());
    assert!(instance.capabilities().is_empty());
}

#[tokio::test]
async fn notification_sink_observes_scripting_activity() {
    let sink = RecordingSink::new();
    let (_holder, collaborators) = sync_collaborators();
    let collaborators = collaborators.with_notifications(sink.clone());

    let instance = ScriptInstance::new(probed_options(&CallbackProbe::new()), collaborators);
    instance.initialize();
    instance.when_loaded().wait().await.unwrap();

    assert!(wait_until(|| {
        sink.events()
            .iter()
            .any(|e| e == events::SCRIPT_TASK_STARTING)
    })
    .await);
}

#[tokio::test]
async fn process_faults_reach_live_engines_only() {
    let (holder, collaborators) = sync_collaborators();
    let instance = ScriptInstance::new(probed_options(&CallbackProbe::new()), collaborators);
    instance.initialize();
    instance.when_loaded().wait().await.unwrap();

    hearth_host::dispatch_fault("segv");
    let engine = holder.engine();
    assert!(wait_until(|| engine.faults() == vec!["segv".to_string()]).await);

    instance.destroy().wait().await.unwrap();
    hearth_host::dispatch_fault("late");
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    assert_eq!(engine.faults(), vec!["segv".to_string()]);
}
