use std::sync::Arc;

use hyper::header::{HOST, LOCATION, WWW_AUTHENTICATE};
use hyper::Request;
use serde::Deserialize;
use toml::Spanned;

use super::config::{build, RuleConfig};
use super::*;
use crate::backend::{Backend, MockBackend, Registry};

fn request(path: &str) -> Parts {
    let (parts, ()) = Request::builder()
        .uri(path)
        .header(HOST, "example.org")
        .body(())
        .unwrap()
        .into_parts();
    parts
}

/// A backend answering `result` (`None` is a communication error) exactly `times` times.
fn backend(name: &str, result: Option<bool>, times: usize) -> NamedBackend {
    let mut mock = MockBackend::new();
    mock.expect_authenticate()
        .times(times)
        .returning(move |_| match result {
            Some(allowed) => Ok(allowed),
            None => Err(backend::Error::Upstream("connection refused".to_string())),
        });
    NamedBackend::new(name, Arc::new(mock))
}

fn rule(paths: &[&str], exceptions: &[&str], backends: Vec<NamedBackend>) -> Rule {
    let to_strings = |items: &[&str]| items.iter().map(ToString::to_string).collect();
    Rule::new(
        to_strings(paths),
        to_strings(exceptions),
        backends,
        FailureHandler::default(),
    )
    .unwrap()
}

#[test]
fn test_path_matches() {
    assert!(path_matches("/", "/anything", true));
    assert!(path_matches("", "/anything", true));
    assert!(path_matches("/api", "/api", true));
    assert!(path_matches("/api", "/api/v1", true));
    assert!(path_matches("/api", "/apiary", true));
    assert!(!path_matches("/api", "/ap", true));
    assert!(!path_matches("/api", "/other/api", true));

    assert!(path_matches("/API", "/api/v1", false));
    assert!(!path_matches("/API", "/api/v1", true));
}

#[test]
fn test_path_matches_non_ascii() {
    assert!(path_matches("/Café", "/café/menu", false));
    assert!(!path_matches("/Café", "/café/menu", true));
    assert!(!path_matches("/abcé", "/abc", false));
    assert!(!path_matches("/ab", "/aé", false));
}

#[test]
fn test_rule_requires_path_and_backend() {
    let result = Rule::new(
        vec![],
        vec![],
        vec![backend("b", Some(true), 0)],
        FailureHandler::default(),
    );
    assert!(matches!(result, Err(Error::MissingPath)));

    let result = Rule::new(
        vec!["/".to_string()],
        vec![],
        vec![],
        FailureHandler::default(),
    );
    assert!(matches!(result, Err(Error::MissingBackend)));
}

#[tokio::test]
async fn test_unmatched_path_is_unprotected() {
    let rules = RuleSet::new(
        vec![rule(&["/private"], &[], vec![backend("b", Some(true), 0)])],
        false,
    );

    let decision = rules.evaluate(&request("/public/index.html")).await;
    assert!(matches!(decision, Decision::Unprotected));
}

#[tokio::test]
async fn test_empty_rule_set_is_unprotected() {
    let rules = RuleSet::default();

    let decision = rules.evaluate(&request("/private")).await;
    assert!(matches!(decision, Decision::Unprotected));
}

#[tokio::test]
async fn test_exception_falls_through_to_later_rules() {
    let rules = RuleSet::new(
        vec![
            rule(&["/"], &["/public"], vec![backend("first", Some(true), 0)]),
            rule(&["/public"], &[], vec![backend("second", Some(true), 1)]),
        ],
        false,
    );

    let decision = rules.evaluate(&request("/public/logo.png")).await;
    assert!(matches!(decision, Decision::Allowed { backend } if backend == "second"));
}

#[tokio::test]
async fn test_exception_without_other_rule_is_unprotected() {
    let rules = RuleSet::new(
        vec![rule(
            &["/private"],
            &["/private/health"],
            vec![backend("b", Some(false), 0)],
        )],
        false,
    );

    let decision = rules.evaluate(&request("/private/health")).await;
    assert!(matches!(decision, Decision::Unprotected));
}

#[tokio::test]
async fn test_first_success_short_circuits() {
    let rules = RuleSet::new(
        vec![rule(
            &["/"],
            &[],
            vec![
                backend("b1", Some(false), 1),
                backend("b2", Some(true), 1),
                backend("b3", Some(true), 0),
            ],
        )],
        false,
    );

    let decision = rules.evaluate(&request("/private")).await;
    assert!(matches!(decision, Decision::Allowed { backend } if backend == "b2"));
}

#[tokio::test]
async fn test_all_denied_invokes_failure_handler() {
    let rule = Rule::new(
        vec!["/".to_string()],
        vec![],
        vec![backend("b1", Some(false), 1), backend("b2", Some(false), 1)],
        FailureHandler::Status {
            code: StatusCode::FORBIDDEN,
        },
    )
    .unwrap();
    let rules = RuleSet::new(vec![rule], false);

    let decision = rules.evaluate(&request("/private")).await;
    let Decision::Denied(denial) = decision else {
        panic!("expected a denial, got {decision:?}");
    };
    assert_eq!(denial.status, StatusCode::FORBIDDEN);
    assert!(denial.headers.is_empty());
}

#[tokio::test]
async fn test_default_failure_is_basic_challenge() {
    let rules = RuleSet::new(
        vec![rule(&["/"], &[], vec![backend("b", Some(false), 1)])],
        false,
    );

    let decision = rules.evaluate(&request("/private")).await;
    let Decision::Denied(denial) = decision else {
        panic!("expected a denial, got {decision:?}");
    };
    assert_eq!(denial.status, StatusCode::UNAUTHORIZED);
    assert_eq!(denial.headers[WWW_AUTHENTICATE], r#"Basic realm="example.org""#);
}

#[tokio::test]
async fn test_backend_error_aborts_evaluation() {
    for position in 0..3 {
        let backends = (0..3)
            .map(|i| match i.cmp(&position) {
                std::cmp::Ordering::Less => backend(&format!("b{i}"), Some(false), 1),
                std::cmp::Ordering::Equal => backend(&format!("b{i}"), None, 1),
                std::cmp::Ordering::Greater => backend(&format!("b{i}"), Some(true), 0),
            })
            .collect();

        let rule = Rule::new(
            vec!["/".to_string()],
            vec![],
            backends,
            FailureHandler::Redirect {
                target: "/login".to_string(),
                target_host: None,
                code: StatusCode::FOUND,
            },
        )
        .unwrap();
        let rules = RuleSet::new(vec![rule], false);

        let decision = rules.evaluate(&request("/private")).await;
        let Decision::Failed(EvaluationError::Backend {
            backend: failed,
            error,
        }) = decision
        else {
            panic!("expected a backend failure, got {decision:?}");
        };
        assert_eq!(failed, format!("b{position}"));
        assert!(matches!(error, backend::Error::Upstream(_)));
    }
}

#[tokio::test]
async fn test_first_declared_rule_wins() {
    let rules = RuleSet::new(
        vec![
            rule(&["/a"], &[], vec![backend("outer", Some(true), 1)]),
            rule(&["/a/b"], &[], vec![backend("inner", Some(true), 0)]),
        ],
        false,
    );

    let (index, _) = rules.select("/a/b").unwrap();
    assert_eq!(index, 0);

    let decision = rules.evaluate(&request("/a/b")).await;
    assert!(matches!(decision, Decision::Allowed { backend } if backend == "outer"));
}

#[tokio::test]
async fn test_case_sensitivity() {
    let insensitive = RuleSet::new(
        vec![rule(&["/Private"], &[], vec![backend("b", Some(true), 1)])],
        false,
    );
    let decision = insensitive.evaluate(&request("/private/x")).await;
    assert!(matches!(decision, Decision::Allowed { .. }));

    let sensitive = RuleSet::new(
        vec![rule(&["/Private"], &[], vec![backend("b", Some(true), 0)])],
        true,
    );
    let decision = sensitive.evaluate(&request("/private/x")).await;
    assert!(matches!(decision, Decision::Unprotected));
}

#[tokio::test]
async fn test_rules_match_canonical_path() {
    let rules = RuleSet::new(
        vec![rule(&["/private"], &[], vec![backend("b", Some(false), 4)])],
        false,
    );

    for path in [
        "/public/../private/x",
        "/public/%2e%2e/private/x",
        "/%70rivate/x",
        "/./private/x",
    ] {
        let decision = rules.evaluate(&request(path)).await;
        assert!(matches!(decision, Decision::Denied(_)), "{path}: {decision:?}");
    }
}

#[tokio::test]
async fn test_exceptions_match_canonical_path() {
    let rules = RuleSet::new(
        vec![rule(
            &["/private"],
            &["/private/health"],
            vec![backend("b", Some(false), 1)],
        )],
        false,
    );

    let decision = rules.evaluate(&request("/private/health/../secrets")).await;
    assert!(matches!(decision, Decision::Denied(_)));
}

#[derive(Deserialize)]
struct RulesFile {
    rules: Vec<Spanned<RuleConfig>>,
}

fn registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .register("allow", |_| {
            let mut mock = MockBackend::new();
            mock.expect_authenticate().returning(|_| Ok(true));
            let backend: Arc<dyn Backend> = Arc::new(mock);
            Ok(backend)
        })
        .unwrap();
    registry
        .register("deny", |_| {
            let mut mock = MockBackend::new();
            mock.expect_authenticate().returning(|_| Ok(false));
            let backend: Arc<dyn Backend> = Arc::new(mock);
            Ok(backend)
        })
        .unwrap();
    registry
}

fn build_from(source: &str) -> Result<RuleSet, Error> {
    let file: RulesFile = toml::from_str(source).unwrap();
    build(&registry(), &file.rules, source, false)
}

#[tokio::test]
async fn test_build_rule_set() {
    let source = r#"
        [[rules]]
        path = "/admin"
        failure = { handler = "redirect", options = "target=/login?next={uri}" }
        backends = [{ name = "deny", options = "" }]

        [[rules]]
        paths = ["/private", "/internal"]
        except = ["/private/health"]
        backends = [
            { name = "deny", options = "" },
            { name = "allow", options = "" },
        ]
    "#;

    let rules = build_from(source).unwrap();
    assert_eq!(rules.len(), 2);
    assert_eq!(rules.rules()[1].paths(), ["/private", "/internal"]);
    assert_eq!(rules.rules()[1].exceptions(), ["/private/health"]);

    let decision = rules.evaluate(&request("/admin/users?page=2")).await;
    let Decision::Denied(denial) = decision else {
        panic!("expected a denial, got {decision:?}");
    };
    assert_eq!(denial.status, StatusCode::FOUND);
    assert_eq!(denial.headers[LOCATION], "/login?next=%2Fadmin%2Fusers%3Fpage%3D2");

    let decision = rules.evaluate(&request("/internal/x")).await;
    assert!(matches!(decision, Decision::Allowed { backend } if backend == "allow"));

    let decision = rules.evaluate(&request("/private/health")).await;
    assert!(matches!(decision, Decision::Unprotected));
}

#[test]
fn test_build_reports_rule_location() {
    let source = "[[rules]]\npaths = [\"/a\"]\nbackends = [{ name = \"allow\", options = \"\" }]\n\n[[rules]]\nbackends = [{ name = \"allow\", options = \"\" }]\n";

    let error = build_from(source).unwrap_err();
    let Error::InRule { rule, line, .. } = &error else {
        panic!("expected a located error, got {error:?}");
    };
    assert_eq!(*rule, 2);
    assert_eq!(*line, Some(5));
    assert!(matches!(error.kind(), Error::MissingPath));
}

#[test]
fn test_build_missing_backend() {
    let source = r#"
        [[rules]]
        paths = ["/a"]
    "#;

    let error = build_from(source).unwrap_err();
    assert!(matches!(error.kind(), Error::MissingBackend));
}

#[test]
fn test_build_unknown_backend() {
    let source = r#"
        [[rules]]
        paths = ["/a"]
        backends = [{ name = "ldap", options = "host=ldap.example.com" }]
    "#;

    let error = build_from(source).unwrap_err();
    assert!(matches!(
        error.kind(),
        Error::Backend { error: backend::Error::UnknownBackend(name), .. } if name == "ldap"
    ));
}

#[test]
fn test_build_invalid_failure() {
    let source = r#"
        [[rules]]
        paths = ["/a"]
        failure = { handler = "redirect", options = "code=301" }
        backends = [{ name = "allow", options = "" }]
    "#;

    let error = build_from(source).unwrap_err();
    assert!(matches!(error.kind(), Error::Failure { handler, .. } if handler == "redirect"));

    let source = r#"
        [[rules]]
        paths = ["/a"]
        failure = { handler = "teapot" }
        backends = [{ name = "allow", options = "" }]
    "#;

    let error = build_from(source).unwrap_err();
    assert!(matches!(
        error.kind(),
        Error::Failure { error: failure::Error::UnknownHandler(_), .. }
    ));
}

#[test]
fn test_malformed_rule_blocks_are_rejected_by_the_parser() {
    let duplicate_failure = r#"
        [[rules]]
        paths = ["/a"]
        failure = { handler = "status" }
        failure = { handler = "basicauth" }
        backends = [{ name = "allow", options = "" }]
    "#;
    assert!(toml::from_str::<RulesFile>(duplicate_failure).is_err());

    let missing_options = r#"
        [[rules]]
        paths = ["/a"]
        backends = [{ name = "allow" }]
    "#;
    assert!(toml::from_str::<RulesFile>(missing_options).is_err());

    let unknown_directive = r#"
        [[rules]]
        paths = ["/a"]
        realm = "x"
        backends = [{ name = "allow", options = "" }]
    "#;
    assert!(toml::from_str::<RulesFile>(unknown_directive).is_err());
}
