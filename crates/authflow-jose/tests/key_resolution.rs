//! Integration tests for discovery-driven key resolution and
//! cross-validation of the assertion builder against jsonwebtoken

use authflow_jose::{
    AssertionKey, JoseError, JwtVerifier, VerificationKey, base64url, build_client_assertion,
    verify_signature,
};
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use serde_json::{Map, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_keypair() -> (RsaPrivateKey, rsa::RsaPublicKey) {
    let mut rng = rand::thread_rng();
    let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("generate RSA key");
    let public_key = private_key.to_public_key();
    (private_key, public_key)
}

/// Serve a discovery document and JWKS for the mock issuer
async fn mount_discovery(server: &MockServer, public_key: &rsa::RsaPublicKey, kid: &str) {
    let issuer = server.uri();

    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": issuer,
            "jwks_uri": format!("{issuer}/jwks"),
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "keys": [{
                "kty": "RSA",
                "kid": kid,
                "use": "sig",
                "alg": "RS256",
                "n": base64url::encode(public_key.n().to_bytes_be()),
                "e": base64url::encode(public_key.e().to_bytes_be()),
            }]
        })))
        .mount(server)
        .await;
}

/// Sign a token with jsonwebtoken whose `iss` points at the mock server
fn issue_token(private_key: &RsaPrivateKey, issuer: &str, kid: &str) -> String {
    use rsa::pkcs8::EncodePrivateKey;

    let pem = private_key.to_pkcs8_pem(LineEnding::LF).unwrap();
    let encoding_key = jsonwebtoken::EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();

    let mut header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
    header.kid = Some(kid.to_string());

    let now = chrono::Utc::now().timestamp();
    let claims = json!({
        "iss": issuer,
        "sub": "alice",
        "exp": now + 600,
        "iat": now,
    });

    jsonwebtoken::encode(&header, &claims, &encoding_key).unwrap()
}

#[tokio::test]
async fn resolves_key_from_discovery_and_verifies() {
    let server = MockServer::start().await;
    let (private_key, public_key) = test_keypair();
    mount_discovery(&server, &public_key, "key-1").await;

    let token = issue_token(&private_key, &server.uri(), "key-1");

    let verifier = JwtVerifier::new();
    assert!(verifier.verify(&token, None, None).await.unwrap());
}

#[tokio::test]
async fn unknown_kid_fails_key_resolution() {
    let server = MockServer::start().await;
    let (private_key, public_key) = test_keypair();
    mount_discovery(&server, &public_key, "key-1").await;

    let token = issue_token(&private_key, &server.uri(), "rotated-away");

    let err = JwtVerifier::new()
        .verify(&token, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, JoseError::KeyResolution { .. }));
}

#[tokio::test]
async fn wrong_issuer_key_fails_verification_not_resolution() {
    let server = MockServer::start().await;
    let (private_key, _) = test_keypair();
    // JWKS publishes a different key under the same kid
    let (_, other_public) = test_keypair();
    mount_discovery(&server, &other_public, "key-1").await;

    let token = issue_token(&private_key, &server.uri(), "key-1");

    assert!(!JwtVerifier::new().verify(&token, None, None).await.unwrap());
}

#[tokio::test]
async fn built_assertion_verifies_under_jsonwebtoken() {
    let (private_key, public_key) = test_keypair();
    let key = AssertionKey::Rsa {
        key: private_key,
        thumbprint: None,
        key_id: None,
    };

    let assertion = build_client_assertion(
        "client-1",
        "https://as.example.com/token",
        &key,
        None,
        &Map::new(),
    )
    .unwrap();

    let public_pem = public_key.to_public_key_pem(LineEnding::LF).unwrap();
    let decoding_key = jsonwebtoken::DecodingKey::from_rsa_pem(public_pem.as_bytes()).unwrap();

    let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::RS256);
    validation.set_audience(&["https://as.example.com/token"]);

    let data =
        jsonwebtoken::decode::<serde_json::Value>(&assertion.jwt, &decoding_key, &validation)
            .expect("assertion must verify under jsonwebtoken");
    assert_eq!(data.claims["iss"], "client-1");
    assert_eq!(data.claims["sub"], "client-1");
}

#[tokio::test]
async fn supplied_public_key_verifies_jsonwebtoken_issued_token() {
    let (private_key, public_key) = test_keypair();
    let token = issue_token(&private_key, "https://as.example.com", "key-1");

    let key = VerificationKey::Rsa(public_key);
    assert!(verify_signature(&token, Some(&key), None).await.unwrap());
}
