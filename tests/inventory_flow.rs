// End-to-end: seed prices, add items, price the rest, value the inventory

use anyhow::Result;
use inventory_valuation::{
    apply_manual_prices, apply_request, CatalogEntry, CatalogStore, InventoryReport, Normalizer,
    PageFetcher, PriceTableExtractor, PriceTableLayout, SqliteCatalog,
};

struct WikiPage(String);

impl PageFetcher for WikiPage {
    fn fetch(&self, _url: &str) -> Result<String> {
        Ok(self.0.clone())
    }
}

fn wiki_page() -> String {
    let mut html = String::from("<html><body>");
    for i in 0..7 {
        html.push_str(&format!(
            r#"<table class="wikitable"><tr><th>Section {}</th></tr></table>"#,
            i
        ));
    }
    html.push_str(
        r#"<table class="wikitable">
            <tr><th></th><th>Item</th><th>Price</th><th></th><th>Item</th><th>Price</th><th></th><th>Item</th><th>Price</th></tr>
            <tr>
                <td><img src="a.png"></td><td>Apples</td><td>$1,500</td>
                <td><img src="b.png"></td><td>Dragon Scales</td><td>$ 2,000,000</td>
                <td><img src="c.png"></td><td>Rare Gem</td><td>?</td>
            </tr>
        </table>"#,
    );
    html.push_str("</body></html>");
    html
}

fn extractor() -> PriceTableExtractor {
    PriceTableExtractor::new(
        "https://wiki.example/Nightmare_Merchant",
        PriceTableLayout::default(),
        Normalizer::default(),
    )
}

#[test]
fn test_full_inventory_flow() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let normalizer = Normalizer::default();

    {
        let mut catalog = SqliteCatalog::open(&path).unwrap();

        let seeded = extractor()
            .ensure_prices(&mut catalog, &WikiPage(wiki_page()))
            .unwrap()
            .unwrap();
        assert_eq!(seeded.prices_applied, 2);
        assert_eq!(seeded.pairs_skipped, 1);

        // Apples are priced already; pão is new
        let needs_pricing =
            apply_request(&mut catalog, &normalizer, "1000 apples, 2 pão e 0 dragon scales").unwrap();
        assert!(needs_pricing);
    }

    // Reopen: everything above was committed
    let mut catalog = SqliteCatalog::open(&path).unwrap();
    assert_eq!(
        catalog.all().unwrap(),
        vec![
            CatalogEntry::new("Apple", 1000, 1500.0),
            CatalogEntry::new("Dragon scale", 0, 2_000_000.0),
            CatalogEntry::new("Pão", 2, 0.0),
        ]
    );

    let updated =
        apply_manual_prices(&mut catalog, &[("Pão".to_string(), "1,000".to_string())]).unwrap();
    assert_eq!(updated, 1);
    assert!(catalog.unpriced().unwrap().is_empty());

    let report = InventoryReport::build(catalog.all().unwrap());
    assert_eq!(report.total_value, 1_502_000.0);
    assert_eq!(report.total_formatted, "1.50KK");
    assert_eq!(report.lines[1].unit_price_formatted, "2KK");

    // A non-empty catalog is not re-seeded
    assert!(extractor()
        .ensure_prices(&mut catalog, &WikiPage(String::new()))
        .unwrap()
        .is_none());

    let events = catalog.events_for_item("Pão").unwrap();
    let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(kinds, vec!["price_set", "item_created"]);
}
