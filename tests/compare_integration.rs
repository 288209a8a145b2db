//! End-to-end comparisons against the mock browser

use std::sync::Arc;

use chromecat::capture::{MockEvent, MockFramebuffer, MockLauncher, MockSite, Rect, Viewport};
use chromecat::compare::{CompareError, Comparator, ComparisonRequest, Side};
use chromecat::diff::Status;
use chromecat::region::{OffsetRegion, SelectorRegion};
use chromecat::session::PageTiming;
use chromecat::store::{ArtifactStore, MemoryStore};

const LIVE: &str = "https://www.example.com/";
const TEST: &str = "https://main--site.example.net/";

/// 400x600 page with a 100x100 block at the bottom
fn page(band_rows: u32) -> MockFramebuffer {
    let mut fb = MockFramebuffer::with_color(400, 600, [240, 240, 240]);
    fb.draw_rect(0, 500, 100, 100, [255, 255, 255]);
    fb.draw_rect(0, 500, 100, band_rows, [0, 0, 0]);
    fb
}

fn comparator(launcher: &MockLauncher, store: &Arc<MemoryStore>) -> Comparator {
    Comparator::new(Arc::new(launcher.clone()), Arc::clone(store) as Arc<dyn ArtifactStore>)
        .with_timing(PageTiming::immediate())
}

#[test]
fn test_default_regions_footer_only() {
    let launcher = MockLauncher::new()
        .site(LIVE, MockSite::new(page(0)).element("#footer", Rect::new(0, 500, 100, 100)))
        .site(TEST, MockSite::new(page(0)).element(".vac-footer", Rect::new(0, 500, 100, 100)));
    let store = Arc::new(MemoryStore::new());

    let response = comparator(&launcher, &store)
        .compare(&ComparisonRequest::new(LIVE, TEST))
        .expect("comparison should complete");

    let names: Vec<_> = response.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["hero-carousel", "quick-links", "products", "footer"]);

    let footer = &response.results[3];
    assert_eq!(footer.status, Status::Pass);
    assert_eq!(footer.diff, 0.0);
    assert_eq!(footer.description.as_deref(), Some("Footer"));
    assert_eq!((footer.width, footer.height), (Some(100), Some(100)));
    for key in [&footer.live_image, &footer.test_image, &footer.diff_image] {
        let key = key.as_deref().expect("artifact key");
        assert!(store.get(key).unwrap().is_some(), "missing {}", key);
    }

    for missing in &response.results[..3] {
        assert_eq!(missing.status, Status::Error);
        assert_eq!(missing.diff, 100.0);
        assert!(missing.error.as_deref().unwrap().starts_with("Element not found: live"));
        assert!(missing.diff_image.is_none());
    }
    assert_eq!(response.summary, "1 passed, 0 close, 3 need work");
}

#[test]
fn test_pass_close_fail_bands() {
    let regions = [
        SelectorRegion::new("pass", ".pass"),
        SelectorRegion::new("close", ".close"),
        SelectorRegion::new("fail", ".fail"),
    ];
    let block = Rect::new(0, 500, 100, 100);
    let mut test_page = page(15);
    test_page.draw_rect(300, 100, 100, 40, [0, 0, 0]);
    let launcher = MockLauncher::new()
        .site(
            LIVE,
            MockSite::new(page(0))
                .element(".pass", block)
                .element(".close", block)
                .element(".fail", block),
        )
        .site(
            TEST,
            MockSite::new(test_page)
                .element(".pass", Rect::new(200, 0, 100, 100))
                .element(".close", block)
                .element(".fail", Rect::new(300, 100, 100, 100)),
        );
    let store = Arc::new(MemoryStore::new());

    let request = ComparisonRequest::new(LIVE, TEST).regions(regions);
    let response = comparator(&launcher, &store).compare(&request).unwrap();

    let verdicts: Vec<_> = response.results.iter().map(|r| (r.status, r.diff)).collect();
    // .pass: near-white on both sides; .close: 15 of 100 rows black; .fail: 40 rows black
    assert_eq!(verdicts[0].0, Status::Pass);
    assert_eq!(verdicts[1], (Status::Close, 15.0));
    assert_eq!(verdicts[2], (Status::Fail, 40.0));
    assert_eq!(response.summary, "1 passed, 1 close, 1 need work");
}

#[test]
fn test_missing_test_element_is_isolated() {
    let launcher = MockLauncher::new()
        .site(
            LIVE,
            MockSite::new(page(0))
                .element(".header", Rect::new(0, 0, 400, 50))
                .element(".footer", Rect::new(0, 500, 100, 100)),
        )
        .site(TEST, MockSite::new(page(0)).element(".header", Rect::new(0, 0, 400, 50)));
    let store = Arc::new(MemoryStore::new());

    let request = ComparisonRequest::new(LIVE, TEST).regions([
        SelectorRegion::new("footer", ".footer"),
        SelectorRegion::new("header", ".header"),
    ]);
    let response = comparator(&launcher, &store).compare(&request).unwrap();

    let footer = &response.results[0];
    assert_eq!(footer.status, Status::Error);
    assert_eq!(footer.error.as_deref(), Some("Element not found: test (.footer)"));
    assert!(footer.live_image.is_none());

    let header = &response.results[1];
    assert_eq!(header.status, Status::Pass);
    assert!(header.error.is_none());
    assert_eq!(response.summary, "1 passed, 0 close, 1 need work");
}

#[test]
fn test_selector_chain_falls_back_in_order() {
    let launcher = MockLauncher::new()
        .site(LIVE, MockSite::new(page(0)).element(".legacy", Rect::new(0, 500, 100, 100)))
        .site(TEST, MockSite::new(page(0)).element(".new-footer", Rect::new(0, 500, 100, 100)));
    let store = Arc::new(MemoryStore::new());

    let request = ComparisonRequest::new(LIVE, TEST)
        .regions([SelectorRegion::new("footer", ".missing, .legacy, .new-footer")]);
    let response = comparator(&launcher, &store).compare(&request).unwrap();

    assert_eq!(response.results[0].status, Status::Pass);
    let captured: Vec<_> = launcher
        .events()
        .into_iter()
        .filter_map(|e| match e {
            MockEvent::ElementCaptured { selector, .. } => Some(selector),
            _ => None,
        })
        .collect();
    assert_eq!(captured, vec![".legacy", ".new-footer"]);
}

#[test]
fn test_corrupt_capture_becomes_error_entry() {
    let launcher = MockLauncher::new()
        .site(
            LIVE,
            MockSite::new(page(0))
                .corrupt_element(".broken")
                .element(".ok", Rect::new(0, 500, 100, 100)),
        )
        .site(
            TEST,
            MockSite::new(page(0))
                .element(".broken", Rect::new(0, 0, 10, 10))
                .element(".ok", Rect::new(0, 500, 100, 100)),
        );
    let store = Arc::new(MemoryStore::new());

    let request = ComparisonRequest::new(LIVE, TEST)
        .regions([SelectorRegion::new("broken", ".broken"), SelectorRegion::new("ok", ".ok")]);
    let response = comparator(&launcher, &store).compare(&request).unwrap();

    assert_eq!(response.results[0].status, Status::Error);
    assert!(response.results[0].error.is_some());
    assert_eq!(response.results[1].status, Status::Pass);
}

#[test]
fn test_self_comparison_uses_live_selectors() {
    let region = SelectorRegion::new("footer", "#footer").with_sides("#footer", ".vac-footer");
    let launcher = MockLauncher::new()
        .site(LIVE, MockSite::new(page(0)).element("#footer", Rect::new(0, 500, 100, 100)));
    let store = Arc::new(MemoryStore::new());

    let request = ComparisonRequest::new(LIVE, LIVE).regions([region]);
    let response = comparator(&launcher, &store).compare(&request).unwrap();

    assert_eq!(response.results[0].status, Status::Pass);
    assert_eq!(response.summary, "1 passed, 0 close, 0 need work");
}

#[test]
fn test_navigation_failure_releases_browser() {
    let launcher = MockLauncher::new()
        .site(LIVE, MockSite::new(page(0)).element(".footer", Rect::new(0, 500, 100, 100)))
        .site(TEST, MockSite::new(page(0)).timing_out());
    let store = Arc::new(MemoryStore::new());

    let request =
        ComparisonRequest::new(LIVE, TEST).regions([SelectorRegion::new("footer", ".footer")]);
    let err = comparator(&launcher, &store).compare(&request).unwrap_err();

    assert!(matches!(err, CompareError::Session { side: Side::Test, .. }));
    assert!(!err.is_request_error());
    let events = launcher.events();
    assert_eq!(events.last(), Some(&MockEvent::BrowserClosed));
    assert!(events.contains(&MockEvent::PageClosed(1)));
    assert!(store.is_empty());
}

#[test]
fn test_launch_failure_is_reported() {
    let launcher = MockLauncher::new().failing();
    let store = Arc::new(MemoryStore::new());
    let err = comparator(&launcher, &store)
        .compare(&ComparisonRequest::new(LIVE, TEST))
        .unwrap_err();
    assert!(!err.is_request_error());
    assert!(launcher.events().is_empty());
}

#[test]
fn test_invalid_requests_never_launch() {
    let launcher = MockLauncher::new();
    let store = Arc::new(MemoryStore::new());
    let comparator = comparator(&launcher, &store);

    let mixed = ComparisonRequest::new(LIVE, TEST).regions([
        chromecat::region::RegionSpec::from(SelectorRegion::new("footer", ".footer")),
        OffsetRegion::new("band", 0, 0, 100).into(),
    ]);
    let duplicate = ComparisonRequest::new(LIVE, TEST).regions([
        SelectorRegion::new("footer", ".footer"),
        SelectorRegion::new("footer", "footer"),
    ]);
    let cases = [
        ComparisonRequest::new("", TEST),
        ComparisonRequest::new(LIVE, "not a url"),
        ComparisonRequest::new(LIVE, TEST).threshold(1.5),
        ComparisonRequest::new(LIVE, TEST).viewport(Viewport::new(0, 900)),
        mixed,
        duplicate,
    ];

    for request in &cases {
        let err = comparator.compare(request).unwrap_err();
        assert!(err.is_request_error(), "{:?} should be a request error", err);
    }
    assert!(launcher.events().is_empty());
}

#[test]
fn test_offset_regions_use_full_page_bands() {
    let launcher = MockLauncher::new()
        .site(LIVE, MockSite::new(page(0)))
        .site(TEST, MockSite::new(page(0)));
    let store = Arc::new(MemoryStore::new());

    let request = ComparisonRequest::new(LIVE, TEST).regions([
        OffsetRegion::new("top", 0, 0, 200).with_description("Top band"),
        OffsetRegion::new("tail", 500, 500, 400),
    ]);
    let response = comparator(&launcher, &store).compare(&request).unwrap();

    let top = &response.results[0];
    assert_eq!(top.status, Status::Pass);
    assert_eq!((top.width, top.height), (Some(400), Some(200)));

    // Runs off the page; the last row repeats
    let tail = &response.results[1];
    assert_eq!(tail.status, Status::Pass);
    assert_eq!(tail.height, Some(400));

    let live_key = response.live_screenshot.as_deref().expect("live page key");
    let test_key = response.test_screenshot.as_deref().expect("test page key");
    assert!(live_key.starts_with("screenshots/") && live_key.ends_with("-live.png"));
    assert!(test_key.ends_with("-test.png"));
    assert!(store.get(live_key).unwrap().is_some());

    let events = launcher.events();
    assert!(events.contains(&MockEvent::PageCaptured { page: 0, full_page: true }));
    assert!(events.contains(&MockEvent::Scrolled { page: 0, y: 500 }));
}

#[test]
fn test_response_json_shape() {
    let launcher = MockLauncher::new()
        .site(LIVE, MockSite::new(page(0)).element(".footer", Rect::new(0, 500, 100, 100)))
        .site(TEST, MockSite::new(page(0)));
    let store = Arc::new(MemoryStore::new());

    let request =
        ComparisonRequest::new(LIVE, TEST).regions([SelectorRegion::new("footer", ".footer")]);
    let response = comparator(&launcher, &store).compare(&request).unwrap();
    let json = serde_json::to_value(&response).unwrap();

    assert_eq!(json["summary"], "0 passed, 0 close, 1 need work");
    assert_eq!(json["results"][0]["status"], "ERROR");
    assert_eq!(json["results"][0]["diff"], 100.0);
    assert!(json["results"][0]["error"].as_str().unwrap().contains("test"));
}

#[test]
fn test_uncapturable_match_moves_to_next_selector() {
    let site = || {
        MockSite::new(page(0))
            .element(".hidden", Rect::new(0, 0, 0, 0))
            .element(".footer", Rect::new(0, 500, 100, 100))
    };
    let launcher = MockLauncher::new().site(LIVE, site()).site(TEST, site());
    let store = Arc::new(MemoryStore::new());

    let request = ComparisonRequest::new(LIVE, TEST)
        .regions([SelectorRegion::new("footer", ".hidden, .footer")]);
    let response = comparator(&launcher, &store).compare(&request).unwrap();

    let footer = &response.results[0];
    assert_eq!(footer.status, Status::Pass, "{:?}", footer.error);
    assert_eq!((footer.width, footer.height), (Some(100), Some(100)));
}

#[test]
fn test_chain_of_uncapturable_matches_reports_last_failure() {
    let site = || MockSite::new(page(0)).element(".hidden", Rect::new(0, 0, 0, 0));
    let launcher = MockLauncher::new().site(LIVE, site()).site(TEST, site());
    let store = Arc::new(MemoryStore::new());

    let request = ComparisonRequest::new(LIVE, TEST)
        .regions([SelectorRegion::new("footer", ".missing, .hidden")]);
    let response = comparator(&launcher, &store).compare(&request).unwrap();

    let footer = &response.results[0];
    assert_eq!(footer.status, Status::Error);
    let error = footer.error.as_deref().unwrap();
    assert!(error.starts_with("live capture failed (.missing, .hidden)"), "{}", error);
}

#[test]
fn test_oversized_band_is_isolated() {
    let launcher = MockLauncher::new()
        .site(LIVE, MockSite::new(MockFramebuffer::new(100, 200)))
        .site(TEST, MockSite::new(MockFramebuffer::new(100, 200)));
    let store = Arc::new(MemoryStore::new());

    let request = ComparisonRequest::new(LIVE, TEST).regions([
        OffsetRegion::new("huge", 0, 0, 4_000_000_000),
        OffsetRegion::new("ok", 0, 0, 50),
    ]);
    let response = comparator(&launcher, &store).compare(&request).unwrap();

    let huge = &response.results[0];
    assert_eq!(huge.status, Status::Error);
    assert_eq!(huge.diff, 100.0);
    assert!(huge.error.as_deref().unwrap().contains("pixel limit"));

    let ok = &response.results[1];
    assert_eq!(ok.status, Status::Pass);
    assert_eq!(ok.height, Some(50));
    assert_eq!(response.summary, "1 passed, 0 close, 1 need work");
}

#[test]
fn test_urls_are_trimmed_before_navigation() {
    let launcher = MockLauncher::new()
        .site(LIVE, MockSite::new(page(0)).element(".footer", Rect::new(0, 500, 100, 100)))
        .site(TEST, MockSite::new(page(0)).element(".footer", Rect::new(0, 500, 100, 100)));
    let store = Arc::new(MemoryStore::new());

    let request = ComparisonRequest::new(format!("  {}", LIVE), format!("{}\n", TEST))
        .regions([SelectorRegion::new("footer", ".footer")]);
    let response = comparator(&launcher, &store).compare(&request).unwrap();

    assert_eq!(response.results[0].status, Status::Pass);
    let navigated: Vec<_> = launcher
        .events()
        .into_iter()
        .filter_map(|e| match e {
            MockEvent::Navigated { url, .. } => Some(url),
            _ => None,
        })
        .collect();
    assert_eq!(navigated, vec![LIVE, TEST]);
}
