//! Integration tests for the tracker flow: pre-init queueing, destination
//! fan-out, and server mirroring, against a recording loader and a capture
//! sink.

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use storefront_core::config::{
        DestinationConfig, SchedulerConfig, SchedulerMode, TrackingConfig,
    };
    use storefront_core::event_bus::{capture_sink, CaptureSink};
    use storefront_core::types::*;
    use storefront_web_sdk::context::{StaticPageContext, FBP_COOKIE};
    use storefront_web_sdk::testing::RecordingLoader;
    use storefront_web_sdk::{CallCommand, HandlePhase, Tracker};

    fn meta_only() -> TrackingConfig {
        let mut config = TrackingConfig::default();
        config.destinations.meta = DestinationConfig::enabled("1234567890");
        config
    }

    fn all_destinations() -> TrackingConfig {
        let mut config = meta_only();
        config.destinations.tiktok = DestinationConfig::enabled("CABC123XYZ");
        config.destinations.google_analytics = DestinationConfig::enabled("G-TEST123");
        config.destinations.google_tag_manager = DestinationConfig::enabled("GTM-ABC123");
        config
    }

    fn setup() -> (Tracker, Arc<RecordingLoader>, Arc<CaptureSink>) {
        let loader = RecordingLoader::new();
        let sink = capture_sink();
        let tracker = Tracker::builder(loader.clone())
            .with_event_sink(sink.clone())
            .build();
        (tracker, loader, sink)
    }

    fn shirt() -> Product {
        Product::new("p1", 100.0).with_name("Linen Shirt").with_quantity(2)
    }

    fn sample_purchase() -> PurchasePayload {
        PurchasePayload {
            order_number: "1001".into(),
            items: vec![shirt(), Product::new("p2", 50.0)],
            value: 250.0,
            currency: Some("USD".into()),
            tax: None,
            shipping: None,
            coupon: None,
        }
    }

    fn every_kind(tracker: &Tracker) {
        let checkout = CheckoutPayload::new(vec![shirt()]);
        tracker.page_view(PagePayload::default());
        tracker.home_page_view(PagePayload::default());
        tracker.search("linen");
        tracker.view_category("Shirts", Some("c1".into()));
        tracker.view_product(shirt());
        tracker.add_to_cart(shirt());
        tracker.remove_from_cart(shirt());
        tracker.update_cart(vec![shirt()]);
        tracker.begin_checkout(checkout.clone());
        tracker.add_shipping_info(checkout.clone(), Some("express".into()));
        tracker.add_payment_info(checkout, Some("card".into()));
        tracker.purchase(sample_purchase(), None);
        tracker.complete_registration(Some("email".into()), None);
        tracker.contact(Some("whatsapp".into()), None);
    }

    fn names(calls: Vec<storefront_web_sdk::DestinationCall>) -> Vec<String> {
        calls.into_iter().map(|c| c.event_name).collect()
    }

    #[tokio::test]
    async fn test_pre_init_events_delivered_once_in_order() {
        let (tracker, loader, sink) = setup();

        tracker.search("boots");
        tracker.view_product(shirt());
        tracker.add_to_cart(shirt());
        assert_eq!(tracker.queued_events(), 3);
        assert_eq!(sink.count(), 0);

        tracker.init(meta_only());
        tracker.flush().await;

        assert_eq!(
            names(loader.event_calls_for(DestinationId::Meta)),
            vec!["Search", "ViewContent", "AddToCart"]
        );
        let mirrored: Vec<String> = sink.envelopes().into_iter().map(|e| e.event_name).collect();
        assert_eq!(mirrored, vec!["Search", "ViewContent", "AddToCart"]);

        // Draining happens once; a later flush adds nothing.
        tracker.flush().await;
        assert_eq!(loader.event_calls_for(DestinationId::Meta).len(), 3);
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let (tracker, loader, _sink) = setup();

        tracker.init(meta_only());
        let mut other = meta_only();
        other.destinations.meta = DestinationConfig::enabled("999");
        other.destinations.tiktok = DestinationConfig::enabled("CABC123XYZ");
        tracker.init(other);
        tracker.flush().await;

        assert_eq!(loader.load_count(DestinationId::Meta), 1);
        assert_eq!(loader.load_count(DestinationId::TikTok), 0);
        let init = loader
            .calls_for(DestinationId::Meta)
            .into_iter()
            .find(|c| c.command == CallCommand::Init)
            .unwrap();
        assert_eq!(init.params["pixel_id"], "1234567890");
    }

    #[tokio::test]
    async fn test_disabled_destination_never_invoked() {
        let (tracker, loader, _sink) = setup();
        tracker.init(meta_only());
        every_kind(&tracker);
        tracker.flush().await;

        for destination in [
            DestinationId::TikTok,
            DestinationId::GoogleAnalytics,
            DestinationId::GoogleTagManager,
        ] {
            assert_eq!(loader.load_count(destination), 0);
            assert!(loader.calls_for(destination).is_empty());
            assert!(!tracker.registry().is_installed(destination));
        }
        assert_eq!(loader.event_calls_for(DestinationId::Meta).len(), 14);
    }

    #[tokio::test]
    async fn test_only_conversion_kinds_are_mirrored() {
        let (tracker, _loader, sink) = setup();
        tracker.init(TrackingConfig::default());
        every_kind(&tracker);
        tracker.flush().await;

        let mirrored: Vec<String> = sink.envelopes().into_iter().map(|e| e.event_name).collect();
        assert_eq!(
            mirrored,
            vec![
                "Search",
                "ViewContent",
                "AddToCart",
                "RemoveFromCart",
                "InitiateCheckout",
                "AddPaymentInfo",
                "Purchase",
                "CompleteRegistration",
            ]
        );
        for excluded in ["PageView", "HomePageView", "ViewCategory", "Contact"] {
            assert!(!mirrored.iter().any(|name| name == excluded));
        }
        assert!(sink
            .events()
            .iter()
            .all(|e| e.endpoint == "http://localhost:3000/api/tracking/default/event"));
    }

    #[tokio::test]
    async fn test_event_ids_unique_and_shared_with_pixel() {
        let (tracker, loader, sink) = setup();
        tracker.init(meta_only());
        for _ in 0..50 {
            tracker.add_to_cart(shirt());
        }
        tracker.flush().await;

        let server_ids: Vec<String> = sink.envelopes().into_iter().map(|e| e.event_id).collect();
        let unique: HashSet<&String> = server_ids.iter().collect();
        assert_eq!(unique.len(), 50);

        let pixel_ids: Vec<String> = loader
            .event_calls_for(DestinationId::Meta)
            .into_iter()
            .filter_map(|c| c.event_id)
            .collect();
        assert_eq!(pixel_ids, server_ids);
    }

    #[tokio::test]
    async fn test_set_user_accumulates_fields() {
        let (tracker, _loader, sink) = setup();
        tracker.init(TrackingConfig::default());

        tracker.set_user(IdentityData::email("a@example.com"));
        tracker.set_user(IdentityData::phone("+15550100"));
        let identity = tracker.identity();
        assert_eq!(identity.email.as_deref(), Some("a@example.com"));
        assert_eq!(identity.phone.as_deref(), Some("+15550100"));

        tracker.purchase(sample_purchase(), None);
        let envelope = &sink.envelopes()[0];
        assert_eq!(envelope.user_data.email.as_deref(), Some("a@example.com"));
        assert_eq!(envelope.user_data.phone.as_deref(), Some("+15550100"));
    }

    #[tokio::test]
    async fn test_call_identity_applies_to_that_call_only() {
        let (tracker, _loader, sink) = setup();
        tracker.init(TrackingConfig::default());
        tracker.set_user(IdentityData::phone("+15550100"));

        tracker.purchase(sample_purchase(), Some(IdentityData::email("b@example.com")));
        tracker.add_to_cart(shirt());

        let envelopes = sink.envelopes();
        assert_eq!(envelopes[0].user_data.email.as_deref(), Some("b@example.com"));
        assert_eq!(envelopes[0].user_data.phone.as_deref(), Some("+15550100"));
        assert!(envelopes[1].user_data.email.is_none());
        assert!(tracker.identity().email.is_none());
    }

    #[tokio::test]
    async fn test_purchase_reaches_every_destination_and_server() {
        let loader = RecordingLoader::new();
        let sink = capture_sink();
        let context = StaticPageContext::new()
            .with_page_url("https://shop.example.com/checkout/thanks")
            .with_cookie(FBP_COOKIE, "fb.1.1700000000.42");
        let tracker = Tracker::builder(loader.clone())
            .with_event_sink(sink.clone())
            .with_page_context(Arc::new(context))
            .build();

        tracker.init(all_destinations());
        tracker.purchase(sample_purchase(), None);
        tracker.flush().await;

        let meta = loader.event_calls_for(DestinationId::Meta);
        assert_eq!(names(meta.clone()), vec!["Purchase"]);
        assert_eq!(meta[0].params["contents"].as_array().unwrap().len(), 2);

        let tiktok = loader.event_calls_for(DestinationId::TikTok);
        assert_eq!(names(tiktok.clone()), vec!["CompletePayment"]);
        assert_eq!(tiktok[0].params["contents"].as_array().unwrap().len(), 2);

        let ga = loader.event_calls_for(DestinationId::GoogleAnalytics);
        assert_eq!(names(ga.clone()), vec!["purchase"]);
        assert_eq!(ga[0].params["items"].as_array().unwrap().len(), 2);

        let gtm = loader.event_calls_for(DestinationId::GoogleTagManager);
        assert_eq!(gtm.len(), 1);
        assert_eq!(gtm[0].params["ecommerce"]["items"].as_array().unwrap().len(), 2);

        let envelopes = sink.envelopes();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(sink.count_kind(EventKind::Purchase), 1);
        assert_eq!(envelopes[0].custom_data["value"], 250.0);
        assert_eq!(envelopes[0].user_data.fbp.as_deref(), Some("fb.1.1700000000.42"));
        assert_eq!(
            envelopes[0].event_source_url.as_deref(),
            Some("https://shop.example.com/checkout/thanks")
        );
    }

    #[tokio::test]
    async fn test_calls_before_script_load_are_replayed() {
        let loader = RecordingLoader::new().with_gate();
        let tracker = Tracker::builder(loader.clone()).build();

        tracker.init(meta_only());
        tracker.add_to_cart(shirt());

        for _ in 0..100 {
            if tracker.registry().buffered(DestinationId::Meta) == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(tracker.registry().buffered(DestinationId::Meta), 2);
        assert!(loader.calls().is_empty());

        loader.open_gate();
        tracker.flush().await;
        assert_eq!(names(loader.calls()), vec!["init", "AddToCart"]);
        assert_eq!(
            tracker.registry().phase(DestinationId::Meta),
            Some(HandlePhase::Ready)
        );
    }

    #[tokio::test]
    async fn test_failed_destination_does_not_affect_others() {
        let loader = RecordingLoader::new().failing(DestinationId::TikTok);
        let tracker = Tracker::builder(loader.clone()).build();
        tracker.init(all_destinations());
        tracker.add_to_cart(shirt());
        tracker.flush().await;

        assert_eq!(
            tracker.registry().phase(DestinationId::TikTok),
            Some(HandlePhase::Failed)
        );
        assert!(loader.calls_for(DestinationId::TikTok).is_empty());
        assert_eq!(loader.event_calls_for(DestinationId::Meta).len(), 1);
        assert_eq!(loader.event_calls_for(DestinationId::GoogleAnalytics).len(), 1);
    }

    #[tokio::test]
    async fn test_server_side_disabled() {
        let (tracker, loader, sink) = setup();
        let mut config = meta_only();
        config.server_side_enabled = false;
        tracker.init(config);
        tracker.purchase(sample_purchase(), Some(IdentityData::email("a@example.com")));
        tracker.flush().await;

        assert_eq!(sink.count(), 0);
        assert_eq!(loader.event_calls_for(DestinationId::Meta).len(), 1);
    }

    #[tokio::test]
    async fn test_store_currency_used_when_payload_has_none() {
        let (tracker, loader, _sink) = setup();
        let mut config = meta_only();
        config.currency = "ILS".into();
        tracker.init(config);
        tracker.add_to_cart(shirt());
        tracker.flush().await;

        let calls = loader.event_calls_for(DestinationId::Meta);
        assert_eq!(calls[0].params["currency"], "ILS");
        assert_eq!(calls[0].params["value"], 200.0);
    }

    fn timer_tracker(loader: Arc<RecordingLoader>, sink: Arc<CaptureSink>) -> Tracker {
        Tracker::builder(loader)
            .with_event_sink(sink)
            .with_scheduler_config(SchedulerConfig {
                mode: SchedulerMode::Timer,
                timer_delay_ms: 1,
                ..SchedulerConfig::default()
            })
            .build()
    }

    fn queries(tracker_calls: Vec<storefront_web_sdk::DestinationCall>) -> Vec<String> {
        tracker_calls
            .into_iter()
            .map(|c| c.params["search_string"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_timer_scheduler_keeps_every_queued_event_in_order() {
        let loader = RecordingLoader::new();
        let sink = capture_sink();
        let tracker = timer_tracker(loader.clone(), sink.clone());

        for i in 0..40 {
            tracker.search(format!("q{i}"));
        }
        tracker.init(meta_only());
        for i in 40..45 {
            tracker.search(format!("q{i}"));
        }
        tracker.flush().await;

        let expected: Vec<String> = (0..45).map(|i| format!("q{i}")).collect();
        let calls = loader.event_calls_for(DestinationId::Meta);
        assert_eq!(calls.len(), 45);
        assert_eq!(queries(calls.clone()), expected);

        let pixel_ids: Vec<String> = calls.into_iter().filter_map(|c| c.event_id).collect();
        let server_ids: Vec<String> = sink.envelopes().into_iter().map(|e| e.event_id).collect();
        assert_eq!(pixel_ids, server_ids);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_timer_scheduler_buffers_until_script_loads() {
        let loader = RecordingLoader::new().with_gate();
        let sink = capture_sink();
        let tracker = timer_tracker(loader.clone(), sink.clone());

        for i in 0..40 {
            tracker.search(format!("q{i}"));
        }
        tracker.init(all_destinations());
        assert_eq!(
            tracker.registry().phase(DestinationId::Meta),
            Some(HandlePhase::Buffering)
        );

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        loader.open_gate();
        tracker.flush().await;

        let expected: Vec<String> = (0..40).map(|i| format!("q{i}")).collect();
        assert_eq!(queries(loader.event_calls_for(DestinationId::Meta)), expected);
        assert_eq!(loader.event_calls_for(DestinationId::TikTok).len(), 40);
        assert_eq!(loader.load_count(DestinationId::Meta), 1);
        assert_eq!(sink.count(), 40);
    }

    #[test]
    fn test_tracker_without_runtime_delivers_in_order() {
        let loader = RecordingLoader::new();
        let sink = capture_sink();
        let tracker = Tracker::builder(loader.clone())
            .with_event_sink(sink.clone())
            .build();

        for i in 0..10 {
            tracker.search(format!("q{i}"));
        }
        tracker.init(meta_only());

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(tracker.flush());

        let expected: Vec<String> = (0..10).map(|i| format!("q{i}")).collect();
        assert_eq!(queries(loader.event_calls_for(DestinationId::Meta)), expected);
        assert_eq!(sink.count(), 10);
    }
}
