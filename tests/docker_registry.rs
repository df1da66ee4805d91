use image_transport::{
    docker::DockerReference, image::ContentDigest, manifest::media_types, ErrorKind,
    ImageReference, SessionConfig,
};
use tokio::io::AsyncReadExt;
use wiremock::{
    matchers::{body_bytes, header, method, path, query_param, query_param_is_missing},
    Mock, MockServer, ResponseTemplate,
};

static REPO: &str = "/v2/library/busybox";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A registry that answers the version check, and nothing else yet
async fn registry() -> MockServer {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

fn reference(server: &MockServer, version: &str) -> DockerReference {
    DockerReference::parse(&format!(
        "//localhost:{}/library/busybox{}",
        server.address().port(),
        version
    ))
    .unwrap()
}

fn config() -> SessionConfig {
    SessionConfig::new("", true)
}

#[tokio::test]
async fn manifest_with_media_type() {
    let server = registry().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/manifests/latest", REPO)))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("test-manifest", media_types::OCI_MANIFEST),
        )
        .expect(1)
        .mount(&server)
        .await;

    let reference = reference(&server, ":latest");
    let src = reference.new_image_source(&config()).await.unwrap();
    assert_eq!(src.intended_docker_reference(), Some(reference.name()));
    let (manifest, media_type) = src.get_manifest(None).await.unwrap();
    assert_eq!(manifest, b"test-manifest");
    assert_eq!(media_type, media_types::OCI_MANIFEST);
}

#[tokio::test]
async fn untagged_names_mean_latest() {
    let server = registry().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/manifests/latest", REPO)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes("m"))
        .expect(1)
        .mount(&server)
        .await;
    let src = reference(&server, "")
        .new_image_source(&config())
        .await
        .unwrap();
    assert_eq!(src.get_manifest(None).await.unwrap().0, b"m");
}

#[tokio::test]
async fn manifest_errors() {
    let server = registry().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/manifests/missing", REPO)))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/manifests/broken", REPO)))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let src = reference(&server, ":missing")
        .new_image_source(&config())
        .await
        .unwrap();
    let err = src.get_manifest(None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let src = reference(&server, ":broken")
        .new_image_source(&config())
        .await
        .unwrap();
    let err = src.get_manifest(None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
}

#[tokio::test]
async fn pinned_manifest_is_verified() {
    let server = registry().await;
    let good = ContentDigest::from_content(b"the-manifest");
    let bad = ContentDigest::from_content(b"another-manifest");
    for digest in &[&good, &bad] {
        Mock::given(method("GET"))
            .and(path(format!("{}/manifests/{}", REPO, digest)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes("the-manifest"))
            .mount(&server)
            .await;
    }

    let src = reference(&server, &format!("@{}", good))
        .new_image_source(&config())
        .await
        .unwrap();
    assert_eq!(src.get_manifest(None).await.unwrap().0, b"the-manifest");

    let src = reference(&server, ":latest")
        .new_image_source(&config())
        .await
        .unwrap();
    let err = src.get_manifest(Some(&bad)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DigestMismatch);
}

#[tokio::test]
async fn blob_download() {
    let server = registry().await;
    let digest = ContentDigest::from_content(b"test-blob");
    Mock::given(method("GET"))
        .and(path(format!("{}/blobs/{}", REPO, digest)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes("test-blob"))
        .mount(&server)
        .await;

    let src = reference(&server, ":latest")
        .new_image_source(&config())
        .await
        .unwrap();
    let mut blob = src.get_blob(digest.as_str()).await.unwrap();
    assert_eq!(blob.size(), Some(9));
    let mut content = String::new();
    blob.read_to_string(&mut content).await.unwrap();
    assert_eq!(content, "test-blob");

    let missing = ContentDigest::from_content(b"missing");
    let err = src.get_blob(missing.as_str()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn blob_digests_are_opaque() {
    let server = registry().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/blobs/digest-test", REPO)))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/blobs/a%2Fb", REPO)))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let src = reference(&server, ":latest")
        .new_image_source(&config())
        .await
        .unwrap();
    let err = src.get_blob("digest-test").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = src.get_blob("a/b").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn signatures_and_delete_unsupported() {
    let server = registry().await;
    let reference = reference(&server, ":latest");

    let src = reference.new_image_source(&config()).await.unwrap();
    assert!(src.get_signatures().await.unwrap().is_empty());
    let err = src.delete().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);

    let mut dest = reference.new_image_destination(&config()).await.unwrap();
    assert!(!dest.supports_signatures());
    dest.put_signatures(&[]).await.unwrap();
    let err = dest
        .put_signatures(&[b"sig1".to_vec(), b"sig2".to_vec()])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
}

#[tokio::test]
async fn session_needs_a_registry() {
    init_logging();
    let server = MockServer::start().await;
    let err = reference(&server, ":latest")
        .new_image_source(&config())
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Connection);
}

#[tokio::test]
async fn tag_listing_pages() {
    let server = registry().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/tags/list", REPO)))
        .and(query_param_is_missing("last"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(
                    "Link",
                    format!("<{}/tags/list?n=2&last=b>; rel=\"next\"", REPO).as_str(),
                )
                .set_body_raw(
                    r#"{"name":"library/busybox","Tags":["a","b"]}"#,
                    "application/json",
                ),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/tags/list", REPO)))
        .and(query_param("last", "b"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(r#"{"name":"library/busybox","tags":["c"]}"#, "application/json"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let image = reference(&server, ":latest")
        .new_docker_image(&config())
        .await
        .unwrap();
    assert_eq!(
        image.source_ref_full_name(),
        format!("localhost:{}/library/busybox", server.address().port())
    );
    assert_eq!(image.repository_tags().await.unwrap(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn tag_listing_errors() {
    let server = registry().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/tags/list", REPO)))
        .respond_with(ResponseTemplate::new(200).set_body_raw("not json", "application/json"))
        .mount(&server)
        .await;
    let image = reference(&server, ":latest")
        .new_docker_image(&config())
        .await
        .unwrap();
    let err = image.repository_tags().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);

    let server = registry().await;
    let image = reference(&server, ":latest")
        .new_docker_image(&config())
        .await
        .unwrap();
    let err = image.repository_tags().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
}

#[tokio::test]
async fn chunked_blob_upload() {
    let server = registry().await;
    let digest = ContentDigest::from_content(b"test-blob");
    let session = format!("{}/blobs/uploads/session-1", REPO);
    Mock::given(method("POST"))
        .and(path(format!("{}/blobs/uploads/", REPO)))
        .respond_with(ResponseTemplate::new(202).insert_header("Location", session.as_str()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(session.as_str()))
        .and(header("Content-Type", "application/octet-stream"))
        .respond_with(ResponseTemplate::new(202).insert_header("Location", session.as_str()))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(session.as_str()))
        .and(query_param("digest", digest.as_str()))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let config = SessionConfig::builder().upload_chunk_size(4).build();
    let mut dest = reference(&server, ":latest")
        .new_image_destination(&config)
        .await
        .unwrap();
    let mut content: &[u8] = b"test-blob";
    dest.put_blob(digest.as_str(), &mut content).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let uploaded: Vec<u8> = requests
        .iter()
        .filter(|request| request.method.to_string() == "PATCH")
        .flat_map(|request| request.body.iter().copied())
        .collect();
    assert_eq!(uploaded, b"test-blob");
    let ranges: Vec<String> = requests
        .iter()
        .filter_map(|request| request.headers.get("Content-Range"))
        .map(|value| value.to_str().unwrap().to_owned())
        .collect();
    assert_eq!(ranges, vec!["0-3", "4-7", "8-8"]);
}

#[tokio::test]
async fn failed_upload_is_cancelled() {
    let server = registry().await;
    let digest = ContentDigest::from_content(b"test-blob");
    let session = format!("{}/blobs/uploads/session-2", REPO);
    Mock::given(method("POST"))
        .and(path(format!("{}/blobs/uploads/", REPO)))
        .respond_with(ResponseTemplate::new(202).insert_header("Location", session.as_str()))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(session.as_str()))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(session.as_str()))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let mut dest = reference(&server, ":latest")
        .new_image_destination(&config())
        .await
        .unwrap();
    let mut content: &[u8] = b"test-blob";
    let err = dest
        .put_blob(digest.as_str(), &mut content)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
}

#[tokio::test]
async fn malformed_upload_location() {
    let server = registry().await;
    let session = format!("{}/blobs/uploads/session-3", REPO);
    Mock::given(method("POST"))
        .and(path(format!("{}/blobs/uploads/", REPO)))
        .respond_with(ResponseTemplate::new(202).insert_header("Location", session.as_str()))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(session.as_str()))
        .respond_with(ResponseTemplate::new(202).insert_header("Location", "http://[::1"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(session.as_str()))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let mut dest = reference(&server, ":latest")
        .new_image_destination(&config())
        .await
        .unwrap();
    let mut content: &[u8] = b"test-blob";
    let err = dest.put_blob("digest-test", &mut content).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(err.to_string().contains("malformed response"), "{}", err);
}

#[tokio::test]
async fn manifest_upload() {
    let server = registry().await;
    let manifest = br#"{"schemaVersion":2,"mediaType":"application/vnd.docker.distribution.manifest.v2+json"}"#;
    let digest = ContentDigest::from_content(manifest);
    Mock::given(method("PUT"))
        .and(path(format!("{}/manifests/latest", REPO)))
        .and(header("Content-Type", media_types::DOCKER_V2_SCHEMA2))
        .and(body_bytes(manifest.to_vec()))
        .respond_with(
            ResponseTemplate::new(201).insert_header("Docker-Content-Digest", digest.as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut dest = reference(&server, ":latest")
        .new_image_destination(&config())
        .await
        .unwrap();
    assert!(dest.canonical_docker_reference().is_none());
    dest.put_manifest(manifest).await.unwrap();

    let canonical = dest.canonical_docker_reference().unwrap();
    assert!(canonical.is_canonical());
    assert_eq!(canonical.tag(), None);
    assert_eq!(canonical.content_digest(), Some(&digest));
    assert_eq!(
        canonical.as_str(),
        format!(
            "localhost:{}/library/busybox@{}",
            server.address().port(),
            digest
        )
    );
}

#[tokio::test]
async fn manifest_upload_computes_digest() {
    let server = registry().await;
    Mock::given(method("PUT"))
        .and(path(format!("{}/manifests/v1", REPO)))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    let mut dest = reference(&server, ":v1")
        .new_image_destination(&config())
        .await
        .unwrap();
    dest.put_manifest(b"test-manifest").await.unwrap();
    assert_eq!(
        dest.canonical_docker_reference().unwrap().content_digest(),
        Some(&ContentDigest::from_content(b"test-manifest"))
    );
}

#[tokio::test]
async fn bearer_token_authentication() {
    let server = registry().await;
    let port = server.address().port();
    Mock::given(method("GET"))
        .and(path(format!("{}/manifests/latest", REPO)))
        .and(header("Authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes("authorized"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/manifests/latest", REPO)))
        .respond_with(ResponseTemplate::new(401).insert_header(
            "WWW-Authenticate",
            format!(
                "Bearer realm=\"http://localhost:{}/token\",service=\"test-registry\",scope=\"repository:library/busybox:pull\"",
                port
            )
            .as_str(),
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/token"))
        .and(query_param("service", "test-registry"))
        .and(query_param("scope", "repository:library/busybox:pull"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(r#"{"token":"secret-token"}"#, "application/json"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let src = reference(&server, ":latest")
        .new_image_source(&config())
        .await
        .unwrap();
    assert_eq!(src.get_manifest(None).await.unwrap().0, b"authorized");
}

#[tokio::test]
async fn unanswerable_challenge() {
    let server = registry().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/manifests/latest", REPO)))
        .respond_with(ResponseTemplate::new(401).insert_header("WWW-Authenticate", "Negotiate"))
        .mount(&server)
        .await;
    let src = reference(&server, ":latest")
        .new_image_source(&config())
        .await
        .unwrap();
    let err = src.get_manifest(None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
}
