use chrono::{Duration, Utc};
use serde_json::json;
use skybridge_cloud::{
    CloudError, ComputeService, CreateServerRequest, Credential, DelegatedScope, IdentityService,
    IdentitySession, ImageService, PendingOperation, PollPolicy, ServerAction, ServiceType,
    Session, VolumeService,
};
use skybridge_openstack::{
    ApiClient, ComputeClient, IdentityClient, IdentityEndpoints, ImageClient, VolumeClient,
};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn session_for(server: &MockServer) -> Session {
    let base = server.uri();
    Session {
        token: "tok-p1".into(),
        expires_at: Utc::now() + Duration::hours(1),
        project_id: "p1".into(),
        user_id: Some("user-1".into()),
        endpoints: [
            (ServiceType::Compute, format!("{}/compute/v2.1", base)),
            (ServiceType::Volume, format!("{}/volume/v3/p1", base)),
            (ServiceType::Image, format!("{}/image", base)),
        ]
        .into_iter()
        .collect(),
        trust_id: None,
        impersonated_user_id: None,
    }
}

fn identity_for(server: &MockServer) -> IdentityClient {
    IdentityClient::new(
        ApiClient::default(),
        IdentityEndpoints::new(
            format!("{}/v2.0", server.uri()),
            format!("{}/v3", server.uri()),
        ),
    )
}

#[tokio::test]
async fn test_v2_password_authentication() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2.0/tokens"))
        .and(body_partial_json(json!({
            "auth": { "passwordCredentials": { "username": "alice" }, "tenantId": "p1" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access": {
                "token": { "id": "tok-v2", "expires": "2099-01-01T00:00:00Z", "tenant": { "id": "p1" } },
                "user": { "id": "user-1" },
                "serviceCatalog": [
                    { "type": "compute", "endpoints": [{ "publicURL": "http://nova/v2.1" }] },
                    { "type": "volumev3", "endpoints": [{ "publicURL": "http://cinder/v3/p1" }] }
                ]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let identity = identity_for(&server);
    let session = identity
        .authenticate(&IdentitySession::BasicAuth {
            credential: Credential::Password {
                username: "alice".into(),
                password: "secret".into(),
            },
            project_id: "p1".into(),
        })
        .await
        .unwrap();

    assert_eq!(session.token, "tok-v2");
    assert_eq!(session.user_id.as_deref(), Some("user-1"));
    assert_eq!(session.endpoint(ServiceType::Volume).unwrap(), "http://cinder/v3/p1");
    assert!(!session.is_trust_scoped());
}

#[tokio::test]
async fn test_v3_trust_scope_reads_subject_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/auth/tokens"))
        .and(body_partial_json(json!({
            "auth": { "scope": { "OS-TRUST:trust": { "id": "trust-1" } } }
        })))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("X-Subject-Token", "tok-trust")
                .set_body_json(json!({
                    "token": {
                        "expires_at": "2099-01-01T00:00:00.000000Z",
                        "user": { "id": "svc-user" },
                        "project": { "id": "p1" },
                        "catalog": [],
                        "OS-TRUST:trust": {
                            "id": "trust-1",
                            "trustor_user": { "id": "user-1" },
                            "impersonation": true
                        }
                    }
                })),
        )
        .mount(&server)
        .await;

    let identity = identity_for(&server);
    let session = identity
        .authenticate(&IdentitySession::DelegatedAuth {
            credential: Credential::Password {
                username: "skybridge".into(),
                password: "svc".into(),
            },
            scope: DelegatedScope::Trust("trust-1".into()),
        })
        .await
        .unwrap();

    assert_eq!(session.token, "tok-trust");
    assert_eq!(session.trust_id.as_deref(), Some("trust-1"));
    assert_eq!(session.impersonated_user_id.as_deref(), Some("user-1"));
    assert_eq!(session.project_id, "p1");
}

#[tokio::test]
async fn test_rejected_credentials_are_authorization_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2.0/tokens"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "The request you have made requires authentication.", "code": 401 }
        })))
        .mount(&server)
        .await;

    let err = identity_for(&server)
        .authenticate(&IdentitySession::BasicAuth {
            credential: Credential::Token("stale".into()),
            project_id: "p1".into(),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, CloudError::Authorization(_)));
}

#[tokio::test]
async fn test_delete_user_transient_failure() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v2.0/users/u-9"))
        .and(header("X-Auth-Token", "tok-p1"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = identity_for(&server)
        .delete_user(&session_for(&server), "u-9")
        .await
        .unwrap_err();

    assert!(matches!(err, CloudError::TransientRemoteFailure(_)));
}

#[tokio::test]
async fn test_create_server_sends_token_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/compute/v2.1/servers"))
        .and(header("X-Auth-Token", "tok-p1"))
        .and(body_partial_json(json!({
            "server": { "name": "web1@u1", "flavorRef": "flv-r", "imageRef": "img-r" }
        })))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "server": { "id": "r1", "adminPass": "x" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let compute = ComputeClient::new(ApiClient::default());
    let created = compute
        .create_server(
            &session_for(&server),
            &CreateServerRequest {
                name: "web1@u1".into(),
                image_ref: Some("img-r".into()),
                flavor_ref: "flv-r".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(created.id, "r1");
    assert_eq!(created.name, "web1@u1");
}

#[tokio::test]
async fn test_get_missing_server_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/compute/v2.1/servers/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "itemNotFound": { "message": "Instance gone could not be found.", "code": 404 }
        })))
        .mount(&server)
        .await;

    let compute = ComputeClient::new(ApiClient::default());
    let err = compute
        .get_server(&session_for(&server), "gone")
        .await
        .unwrap_err();

    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_find_servers_by_name_uses_anchored_filter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/compute/v2.1/servers/detail"))
        .and(query_param("name", "^web1@u1$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "servers": [
                { "id": "r1", "name": "web1@u1", "status": "ACTIVE", "OS-EXT-STS:power_state": 1 },
                { "id": "r2", "name": "web1@u1-old", "status": "ACTIVE" }
            ]
        })))
        .mount(&server)
        .await;

    let compute = ComputeClient::new(ApiClient::default());
    let found = compute
        .find_servers_by_name(&session_for(&server), "web1@u1")
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "r1");
    assert_eq!(found[0].power_state, Some(1));
}

#[tokio::test]
async fn test_server_actions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/compute/v2.1/servers/r1/action"))
        .and(body_partial_json(json!({ "reboot": { "type": "SOFT" } })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let compute = ComputeClient::new(ApiClient::default());
    compute
        .server_action(&session_for(&server), "r1", ServerAction::Reboot)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_action_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/compute/v2.1/servers/r1/action"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "conflictingRequest": { "message": "Cannot 'start' instance r1 while it is in vm_state active", "code": 409 }
        })))
        .mount(&server)
        .await;

    let compute = ComputeClient::new(ApiClient::default());
    let err = compute
        .server_action(&session_for(&server), "r1", ServerAction::Start)
        .await
        .unwrap_err();

    assert!(matches!(err, CloudError::Conflict(_)));
}

#[tokio::test]
async fn test_wait_for_volume_reaches_in_use() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/volume/v3/p1/volumes/rv1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "volume": { "id": "rv1", "name": "data@v1", "status": "in-use", "size": 10, "attachments": [] }
        })))
        .mount(&server)
        .await;

    let volumes = VolumeClient::new(ApiClient::default());
    let pending = PendingOperation::until_status(
        "volume rv1",
        &["in-use"],
        PollPolicy::fixed(std::time::Duration::from_millis(10), std::time::Duration::from_secs(5)),
    );
    let observed = volumes
        .wait_for_volume(&session_for(&server), "rv1", &pending)
        .await
        .unwrap();

    assert_eq!(observed, skybridge_cloud::Observation::Status("in-use".into()));
}

#[tokio::test]
async fn test_image_endpoint_gets_version_prefix() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/image/v2/images"))
        .and(query_param("name", "ubuntu-24.04"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "images": [{ "id": "img-r", "name": "ubuntu-24.04", "status": "active" }]
        })))
        .mount(&server)
        .await;

    let images = ImageClient::new(ApiClient::default());
    let found = images
        .find_images_by_name(&session_for(&server), "ubuntu-24.04")
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "img-r");
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_error() {
    let mut session = {
        let server = MockServer::start().await;
        session_for(&server)
    };
    session.endpoints.insert(ServiceType::Compute, "http://127.0.0.1:9/v2.1".into());

    let compute = ComputeClient::new(ApiClient::default());
    let err = compute.list_servers(&session).await.unwrap_err();
    assert!(matches!(err, CloudError::Transport(_)));
}
