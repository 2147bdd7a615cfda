/* -------------------------------------------------------------------------- *\
 *                |   █████╗ ██╗   ██╗██████╗  █████╗ ███████╗ |              *
 *                |  ██╔══██╗██║   ██║██╔══██╗██╔══██╗██╔════╝ |              *
 *                |  ███████║██║   ██║██████╔╝███████║█████╗   |              *
 *                |  ██╔══██║██║   ██║██╔══██╗██╔══██║██╔══╝   |              *
 *                |  ██║  ██║╚██████╔╝██║  ██║██║  ██║███████╗ |              *
 *                |  ╚═╝  ╚═╝ ╚═════╝ ╚═╝  ╚═╝╚═╝  ╚═╝╚══════╝ |              *
 *                +--------------------------------------------+              *
 *                                                                            *
 *                         Distributed Systems Runtime                        *
 * -------------------------------------------------------------------------- *
 * Copyright 2022 - 2024, the aurae contributors                              *
 * SPDX-License-Identifier: Apache-2.0                                        *
\* -------------------------------------------------------------------------- */

mod common;

use common::*;
use corrald::containers::{
    validate_image_manifest, ContainerManager, ContainerState, ContainersError,
    ManagerOptions,
};
use corrald::schema::{
    AcIdentifier, Annotation, Isolator, Label, NamespaceKind,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

#[tokio::test]
async fn create_must_register_and_start_the_container() {
    let harness = Harness::new(Behavior::Run);

    let container = harness
        .manager
        .create("web", manifest("example.com/nginx", vec![]), IMAGE_HASH)
        .await
        .expect("admitted");

    // Registered before create returns, whatever startup does later.
    let listed = harness.manager.list().await;
    assert_eq!(listed.len(), 1);
    assert!(Arc::ptr_eq(&listed[0], &container));
    assert!(harness.manager.get(&container.id()).await.is_some());

    container.wait_for_running().await.expect("running");
    assert_eq!(container.state().await, ContainerState::Running);
    assert_eq!(container.name().as_str(), "web");

    let child = format!("corral/{}", container.id());
    let pid = container.pid().await.expect("pid");
    {
        let journal = harness.cgroups.journal();
        assert_eq!(journal.parents, vec!["corral".to_string()]);
        assert_eq!(journal.children[0].0.to_string_lossy(), child);
        assert_eq!(journal.tasks[0].1, pid);
    }

    let launched = harness.launcher.launched();
    assert_eq!(launched.len(), 1);
    assert_eq!(launched[0].container_id, container.id());
    assert_eq!(launched[0].exec, vec!["/bin/app".to_string()]);
    assert_eq!(
        launched[0].namespaces,
        vec![
            NamespaceKind::Ipc,
            NamespaceKind::Net,
            NamespaceKind::Pid,
            NamespaceKind::Uts
        ]
    );
    assert_eq!(launched[0].host_socket, None);

    assert_eq!(container.interfaces().await.len(), 1);
    assert_eq!(
        *harness.network.attached.lock().expect("attached"),
        vec![container.id().to_string()]
    );
}

#[tokio::test]
async fn create_with_blank_name_must_derive_it_from_the_image() {
    let harness = Harness::new(Behavior::Run);

    let mut manifest = manifest("example.com/app", vec![]);
    manifest.labels = vec![Label {
        name: AcIdentifier::try_from("os".to_string()).expect("label"),
        value: "linux".into(),
    }];
    manifest.annotations = vec![Annotation {
        name: AcIdentifier::try_from("authors".to_string()).expect("annotation"),
        value: "ops@example.com".into(),
    }];

    let container = harness
        .manager
        .create("", manifest.clone(), IMAGE_HASH)
        .await
        .expect("admitted");

    assert_eq!(container.name().as_str(), "app");
    assert_eq!(container.image_hash().as_str(), IMAGE_HASH);
    assert_eq!(container.image_manifest(), &manifest);

    let pod = container.pod_manifest();
    assert_eq!(pod.ac_kind, "PodManifest");
    assert_eq!(pod.annotations, manifest.annotations);
    assert_eq!(pod.apps.len(), 1);
    let app = &pod.apps[0];
    assert_eq!(app.name.as_str(), "app");
    assert_eq!(app.image.id.as_str(), IMAGE_HASH);
    assert_eq!(app.image.name.as_ref(), Some(&manifest.name));
    assert_eq!(app.image.labels, manifest.labels);
    assert_eq!(app.app, manifest.app);
}

#[tokio::test]
async fn create_must_sanitize_derived_names() {
    let harness = Harness::new(Behavior::Run);

    let container = harness
        .manager
        .create("  ", manifest("example.com/tools/my_app", vec![]), IMAGE_HASH)
        .await
        .expect("admitted");

    assert_eq!(container.name().as_str(), "my-app");
}

#[tokio::test]
async fn create_must_reject_host_namespaces_the_policy_requires() {
    let harness = Harness::new(Behavior::Run);

    let result = harness
        .manager
        .create(
            "web",
            manifest("example.com/app", vec![namespaces(json!({ "net": "host" }))]),
            IMAGE_HASH,
        )
        .await;

    assert!(matches!(
        result,
        Err(ContainersError::IsolationPolicyViolation {
            namespace: NamespaceKind::Net
        })
    ));
    assert!(harness.manager.list().await.is_empty());
    assert!(harness.launcher.launched().is_empty());
}

#[tokio::test]
async fn create_must_reject_manifests_without_an_app() {
    let harness = Harness::new(Behavior::Run);
    let mut manifest = manifest("example.com/app", vec![]);
    manifest.app = None;

    assert!(matches!(
        harness.manager.create("web", manifest, IMAGE_HASH).await,
        Err(ContainersError::MissingApp)
    ));
    assert!(harness.manager.list().await.is_empty());
}

#[tokio::test]
async fn create_must_reject_bad_references_and_names() {
    let harness = Harness::new(Behavior::Run);

    assert!(matches!(
        harness
            .manager
            .create("web", manifest("example.com/app", vec![]), "md5-0a1b")
            .await,
        Err(ContainersError::InvalidImageReference { .. })
    ));
    assert!(matches!(
        harness
            .manager
            .create("Web Server", manifest("example.com/app", vec![]), IMAGE_HASH)
            .await,
        Err(ContainersError::InvalidName { .. })
    ));
    assert!(matches!(
        harness
            .manager
            .create(
                "web",
                manifest(
                    "example.com/app",
                    vec![Isolator {
                        name: "resource/memory".into(),
                        value: json!({ "limit": "lots" }),
                    }]
                ),
                IMAGE_HASH
            )
            .await,
        Err(ContainersError::InvalidIsolator { .. })
    ));
    assert!(harness.manager.list().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_must_all_be_registered_with_unique_ids() {
    let harness = Harness::new(Behavior::Run);

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let manager = harness.manager.clone();
            tokio::spawn(async move {
                manager
                    .create(
                        &format!("app-{i}"),
                        manifest("example.com/app", vec![]),
                        IMAGE_HASH,
                    )
                    .await
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for task in tasks {
        let container = task.await.expect("join").expect("admitted");
        assert!(ids.insert(container.id()));
    }

    let listed: HashSet<_> =
        harness.manager.list().await.iter().map(|c| c.id()).collect();
    assert_eq!(listed, ids);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_blank_names_must_both_be_admitted() {
    let harness = Harness::new(Behavior::Run);

    let create = || {
        let manager = harness.manager.clone();
        tokio::spawn(async move {
            manager
                .create("", manifest("example.com/app", vec![]), IMAGE_HASH)
                .await
        })
    };
    let (first, second) = tokio::join!(create(), create());
    let first = first.expect("join").expect("admitted");
    let second = second.expect("join").expect("admitted");

    assert_ne!(first.id(), second.id());
    assert_eq!(first.name().as_str(), "app");
    assert_eq!(second.name().as_str(), "app");
    assert_eq!(harness.manager.list().await.len(), 2);
}

#[tokio::test]
async fn unknown_ids_must_be_handled_quietly() {
    let harness = Harness::new(Behavior::Run);
    let id = corrald::containers::ContainerId::new();

    assert!(harness.manager.get(&id).await.is_none());
    assert!(harness.manager.remove(&id).await.is_none());
    assert!(matches!(
        harness.manager.wait(&id).await,
        Err(ContainersError::NotFound { .. })
    ));
}

#[tokio::test]
async fn construction_must_fail_on_unsupported_hosts() {
    let root = Harness::root();
    let unsupported = FakeCgroups { unsupported: true, ..Default::default() };

    let result = ContainerManager::with_capabilities(
        Arc::new(FakeImageManager::default()),
        Arc::new(FakeNetworkManager::default()),
        &unsupported,
        Arc::new(FakeLauncher::new(Behavior::Run)),
        Harness::options(&root),
    );
    assert!(matches!(result, Err(ContainersError::HostUnsupported { .. })));
    assert!(unsupported.journal().parents.is_empty());

    let broken = FakeCgroups { fail_parent: true, ..Default::default() };
    let result = ContainerManager::with_capabilities(
        Arc::new(FakeImageManager::default()),
        Arc::new(FakeNetworkManager::default()),
        &broken,
        Arc::new(FakeLauncher::new(Behavior::Run)),
        ManagerOptions { parent_cgroup_name: "edge".into(), ..Harness::options(&root) },
    );
    match result {
        Err(ContainersError::CgroupSetupFailed { name, .. }) => assert_eq!(name, "edge"),
        other => panic!("unexpected {other:?}"),
    }

    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn create_from_reference_must_resolve_through_the_image_manager() {
    let harness = Harness::new(Behavior::Run);

    let container = harness
        .manager
        .create_from_reference("example.com/app")
        .await
        .expect("admitted");
    assert_eq!(container.name().as_str(), "app");
    assert_eq!(container.image_hash().as_str(), IMAGE_HASH);

    assert!(matches!(
        harness.manager.create_from_reference("example.com/missing").await,
        Err(ContainersError::Image(_))
    ));
}

#[tokio::test]
async fn host_socket_must_only_reach_containers_granted_access() {
    let root = Harness::root();
    let mut harness =
        Harness::with_options(Behavior::Run, Harness::options(&root), root);
    harness.manager = harness.manager.clone().with_host_socket_file("/run/corral.sock");

    let granted = harness
        .manager
        .create(
            "granted",
            manifest(
                "example.com/app",
                vec![Isolator {
                    name: "corral/host-api-access".into(),
                    value: json!(true),
                }],
            ),
            IMAGE_HASH,
        )
        .await
        .expect("admitted");
    granted.wait_for_running().await.expect("running");

    let plain = harness
        .manager
        .create("plain", manifest("example.com/app", vec![]), IMAGE_HASH)
        .await
        .expect("admitted");
    plain.wait_for_running().await.expect("running");

    let launched = harness.launcher.launched();
    let socket_of = |name: &str| {
        launched
            .iter()
            .find(|spec| spec.hostname == name)
            .and_then(|spec| spec.host_socket.clone())
    };
    assert_eq!(socket_of("granted"), Some("/run/corral.sock".into()));
    assert_eq!(socket_of("plain"), None);
}

#[test]
fn validation_must_only_reject_required_kinds_set_to_host() {
    let required = ManagerOptions::default().required_namespaces;

    let user_host = manifest("example.com/app", vec![namespaces(json!({ "user": "host" }))]);
    assert!(validate_image_manifest(&user_host, &required).is_ok());

    let silent = manifest("example.com/app", vec![namespaces(json!({}))]);
    assert!(validate_image_manifest(&silent, &required).is_ok());

    let uts_host = manifest("example.com/app", vec![namespaces(json!({ "uts": "host" }))]);
    assert!(matches!(
        validate_image_manifest(&uts_host, &required),
        Err(ContainersError::IsolationPolicyViolation { namespace: NamespaceKind::Uts })
    ));
}
