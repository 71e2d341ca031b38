//! Shared mock-site helpers for integration tests.
//!
//! Builds catalog pages and `book_data.php` bodies shaped like the real site
//! and mounts them on a wiremock server.

#![allow(dead_code)]

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Hash used in the `book_data.php?h=...` reference of generated pages.
pub const BOOK_DATA_HASH: &str = "f00dCafe";

/// Catalog page with a `font_big` title, a `font.status` author list and a
/// metadata reference.
pub fn catalog_html(title: &str, authors: &[&str]) -> String {
    let anchors: String = authors
        .iter()
        .enumerate()
        .map(|(i, name)| format!(r#"<a href="/l/{i}.htm">{name}</a> "#))
        .collect();
    format!(
        r#"<html><head><title>{title}</title></head><body>
<table><tr><td class="font_big">{title}</td></tr></table>
<font class="status">Author: {anchors}</font>
<script type="text/javascript">
  $.getScript("/book_data.php?h={BOOK_DATA_HASH}&_=1");
</script>
</body></html>"#
    )
}

/// `book_data.php` body carrying one `volinfo` record per `(id, name)`.
pub fn book_data_body(volumes: &[(&str, &str)]) -> String {
    volumes
        .iter()
        .map(|(id, name)| format!(r#"vols.push("volinfo={id},0,1,2,3,{name},extra");"#))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Mounts the catalog page and metadata block of one series.
pub async fn mount_series(
    server: &MockServer,
    series_id: u64,
    title: &str,
    authors: &[&str],
    volumes: &[(&str, &str)],
) {
    Mock::given(method("GET"))
        .and(path(format!("/c/{series_id}.htm")))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(catalog_html(title, authors), "text/html"),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/book_data.php"))
        .and(query_param("h", BOOK_DATA_HASH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(book_data_body(volumes), "application/javascript"),
        )
        .mount(server)
        .await;
}

/// Site path of the epub/VIP2 asset of a volume.
pub fn epub_path(series_id: u64, volume_id: &str) -> String {
    format!("/down/{series_id}/{volume_id}/1/2/1-0/")
}

/// A successful asset response.
pub fn asset_response(body: &[u8]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_vec(), "application/octet-stream")
}
