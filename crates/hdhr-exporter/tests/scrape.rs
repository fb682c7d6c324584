//! Scrape a mock device end to end over TCP.

use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use hdhr_exporter::{router, tcp_dial};
use hdhr_test_harness::MockDevice;
use tower::ServiceExt;

const CABLECARD_DEBUG: &str = "tun: ch=qam:33 lock=qam256:33 ss=83 snq=90 seq=100 dbg=-494/13726\n\
                               dev: bps=38807712 resync=0 overflow=0\n\
                               cc: bps=38807712 resync=0 overflow=0\n\
                               ts: bps=38807712 te=0 crc=0\n\
                               net: pps=3 err=0 stop=0\n";

async fn scrape(target: &str) -> (StatusCode, String) {
    let app = router("/metrics", tcp_dial(Duration::from_secs(2)));
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/metrics?target={target}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn scrape_mock_device() {
    let device = MockDevice::new()
        .variable("/sys/model", "hdhomerun3_cablecard")
        .tuners(2, CABLECARD_DEBUG)
        .start()
        .await
        .unwrap();

    let (status, body) = scrape(&device.addr().to_string()).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    for line in [
        "hdhomerun_device_info{model=\"hdhomerun3_cablecard\"} 1",
        "hdhomerun_tuner_info{tuner=\"1\",channel=\"qam:33\",lock=\"qam256:33\"} 1",
        "hdhomerun_tuner_signal_strength_ratio{tuner=\"0\"} 0.83",
        "hdhomerun_cablecard_bytes_per_second 4850964",
        "hdhomerun_network_packets_per_second{tuner=\"0\"} 3",
    ] {
        assert!(body.lines().any(|l| l == line), "missing {line:?} in:\n{body}");
    }

    // Model, a probe and a debug query per tuner, and the final probe.
    assert_eq!(device.requests(), 6);
}

#[tokio::test]
async fn scrape_fails_without_model() {
    let device = MockDevice::new()
        .tuners(1, CABLECARD_DEBUG)
        .start()
        .await
        .unwrap();

    let (status, body) = scrape(&device.addr().to_string()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("unknown getset variable"), "{body}");
}

#[tokio::test]
async fn scrape_unreachable_device() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let (status, body) = scrape(&addr).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.starts_with("failed to dial HDHomeRun device at"), "{body}");
}
