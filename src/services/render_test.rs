use super::*;

fn page(title: &str, path: &str) -> Page {
    Page { id: Uuid::new_v4(), project_id: Uuid::new_v4(), title: title.into(), path: path.into() }
}

#[test]
fn document_wraps_body_and_escapes_title() {
    let html = page_document(&page("Tom & Jerry", "/tom"), "<p>hi</p>");
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("<title>Tom &amp; Jerry</title>"));
    assert!(html.contains(r#"<body data-page-path="/tom">"#));
    assert!(html.contains("\n<p>hi</p>\n"));
}

#[test]
fn render_errors_forward_codes() {
    let err = RenderError::from(ProjectError::PageNotFound(Uuid::nil()));
    assert_eq!(err.error_code(), "E_PAGE_NOT_FOUND");
    assert!(!err.retryable());
}
