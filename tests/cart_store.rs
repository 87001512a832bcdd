//! File-backed cart store behaviour across process restarts.

use std::fs;

use storefront::cart::{CartStore, FilePersistence};
use storefront::domain::aggregates::NewCartItem;
use storefront::domain::value_objects::{CartKey, Money, ProductId, Size};

fn shirt(size: &str) -> NewCartItem {
    NewCartItem::sized(
        ProductId::new("p1").expect("id"),
        "Shirt",
        Money::from_minor(2000),
        Size::new(size),
        Some("https://cdn.test/shirt.jpg".into()),
    )
}

fn key(raw: &str) -> CartKey {
    CartKey::parse_legacy(raw).expect("key")
}

#[test]
fn lines_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");

    let mut store = CartStore::open(FilePersistence::new(dir.path()));
    store.add(shirt("M"));
    store.add(shirt("M"));
    store.add(shirt("L"));
    store.set_quantity(&key("p1-L"), 3);
    drop(store);

    let reopened = CartStore::open(FilePersistence::new(dir.path()));
    assert_eq!(reopened.quantity(&key("p1-M")), 2);
    assert_eq!(reopened.quantity(&key("p1-L")), 3);
    assert_eq!(reopened.count(), 5);
    assert_eq!(reopened.total(), Money::from_minor(10_000));
}

#[test]
fn written_file_uses_versioned_envelope() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = CartStore::open(FilePersistence::new(dir.path()));
    store.add(shirt("S"));

    let raw = fs::read_to_string(store.persistence().path()).expect("cart file");
    let json: serde_json::Value = serde_json::from_str(&raw).expect("json");
    assert_eq!(json["version"], 1);
    assert_eq!(json["lines"][0]["product_id"], "p1");
    assert_eq!(json["lines"][0]["size"], "S");
}

#[test]
fn legacy_array_is_migrated_on_next_write() {
    let dir = tempfile::tempdir().expect("tempdir");
    let persistence = FilePersistence::new(dir.path());
    fs::write(
        persistence.path(),
        r#"[{"id":"camisa-azul-XL","name":"Camisa azul - Talla XL","price":3500,"quantity":2,"image":null},
            {"id":"p9","name":"Gorra","price":900,"quantity":0}]"#,
    )
    .expect("seed legacy file");

    let mut store = CartStore::open(persistence);
    let migrated = key("camisa-azul-XL");
    assert_eq!(migrated.product_id.as_str(), "camisa-azul");
    assert_eq!(store.quantity(&migrated), 2);
    assert_eq!(store.lines().len(), 1);

    store.open_panel();
    store.set_quantity(&migrated, 1);
    let raw = fs::read_to_string(store.persistence().path()).expect("cart file");
    assert!(raw.starts_with(r#"{"version":1"#));
}

#[test]
fn corrupt_file_opens_empty_and_is_overwritten() {
    let dir = tempfile::tempdir().expect("tempdir");
    let persistence = FilePersistence::named(dir.path(), "guest");
    fs::write(persistence.path(), "{not json").expect("seed corrupt file");

    let mut store = CartStore::open(persistence);
    assert!(store.is_empty());

    store.add(shirt("M"));
    let reopened = CartStore::open(FilePersistence::named(dir.path(), "guest"));
    assert_eq!(reopened.count(), 1);
}

#[test]
fn clear_persists_empty_cart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = CartStore::open(FilePersistence::new(dir.path()));
    store.add(shirt("M"));
    store.clear();

    let reopened = CartStore::open(FilePersistence::new(dir.path()));
    assert!(reopened.is_empty());
}
