// Built-in region set used when a request names no regions

use crate::region::{RegionSpec, SelectorRegion};

/// The four regions of the reference site migration: hero, quick links, products, footer.
pub fn default_regions() -> Vec<RegionSpec> {
    vec![
        SelectorRegion::new(
            "hero-carousel",
            ".cargo-carousel, .cmp-carousel, .vac-hero-carousel",
        )
        .with_description("Hero Carousel")
        .with_sides(".cargo-carousel, .cmp-carousel", ".vac-hero-carousel")
        .into(),
        SelectorRegion::new(
            "quick-links",
            ".bookPanelWrapper, .bookpanel, .vac-quick-links",
        )
        .with_description("Quick Links / Book Panel")
        .with_sides(".bookPanelWrapper, .bookpanel", ".vac-quick-links")
        .into(),
        SelectorRegion::new(
            "products",
            ".textAsset3ColVideo, .textAssetMultiColComp, .vac-product-cards",
        )
        .with_description("Product Cards (Explore our product range)")
        .with_sides(".textAsset3ColVideo, .textAssetMultiColComp", ".vac-product-cards")
        .into(),
        SelectorRegion::new("footer", "#footer, .footer_links, .vac-footer, footer")
            .with_description("Footer")
            .with_sides("#footer, .footer_links, footer", ".vac-footer")
            .into(),
    ]
}
