//! Splitter fan-out scenarios: one upstream PMU, several downstream PDCs.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

use synchrophasor::ieee_c37_118::data_frame::DataFrame;
use synchrophasor::{Pdc, Pmu, StreamSplitter};

async fn start_pmu(data_rate: i16) -> (Arc<Pmu>, u16) {
    let pmu = Arc::new(Pmu::new(7734, "127.0.0.1", 0, "Station A", data_rate).unwrap());
    pmu.set_ieee_data_sample().unwrap();
    pmu.run().await.unwrap();
    let port = pmu.local_addr().unwrap().port();

    let ticker = pmu.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(ticker.tick_interval());
        loop {
            interval.tick().await;
            if ticker.send_sample().is_err() {
                break;
            }
        }
    });

    (pmu, port)
}

async fn collect_frames(pdc: &mut Pdc, count: usize) -> Vec<DataFrame> {
    let mut frames = Vec::with_capacity(count);
    while frames.len() < count {
        let frame = timeout(Duration::from_secs(5), pdc.get())
            .await
            .expect("stream stalled")
            .expect("stream closed early");
        frames.push(frame);
    }
    frames
}

#[tokio::test]
async fn test_fan_out_to_two_clients() {
    let (upstream, up_port) = start_pmu(10).await;
    let splitter = StreamSplitter::new("127.0.0.1", up_port, "127.0.0.1", 0, 7734).unwrap();
    splitter.run().await.unwrap();
    let port = splitter.local_addr().unwrap().port();

    let mut a = Pdc::new(7734, "127.0.0.1", port);
    a.run().await.unwrap();
    let cfg_a = a.get_config().await.unwrap().expect("no configuration for A");
    assert_eq!(cfg_a.stations[0].station_name, "Station A       ");
    assert_eq!(cfg_a.data_rate, 10);

    let mut b = Pdc::new(7734, "127.0.0.1", port);
    b.run().await.unwrap();
    let cfg_b = b.get_config().await.unwrap().expect("no configuration for B");
    assert_eq!(cfg_b, cfg_a, "both clients must see the same configuration");

    a.start().await.unwrap();
    b.start().await.unwrap();

    let (frames_a, frames_b) = tokio::join!(collect_frames(&mut a, 8), collect_frames(&mut b, 8));

    // Both windows cover the same broadcast stream: align on the first
    // shared frame and the remainders must match exactly (no reordering,
    // no duplication).
    let shared = frames_a
        .iter()
        .find(|frame| frames_b.contains(frame))
        .expect("the two clients saw disjoint streams");
    let ia = frames_a.iter().position(|f| f == shared).unwrap();
    let ib = frames_b.iter().position(|f| f == shared).unwrap();
    let n = (frames_a.len() - ia).min(frames_b.len() - ib);
    assert!(n >= 2);
    assert_eq!(frames_a[ia..ia + n], frames_b[ib..ib + n]);

    // While clients are attached the splitter keeps upstream transmission
    // on; once both leave it turns it off.
    assert_eq!(upstream.streaming_count(), 1);
    a.quit();
    b.quit();
    for _ in 0..50 {
        if upstream.streaming_count() == 0 {
            break;
        }
        sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(
        upstream.streaming_count(),
        0,
        "splitter left upstream transmission on with no downstream clients"
    );

    splitter.stop();
    splitter.join().await;
    upstream.stop();
    upstream.join().await;
}

#[tokio::test]
async fn test_header_served_from_cache() {
    let (upstream, up_port) = start_pmu(10).await;
    upstream.set_header(Some("upstream source"));

    let splitter = StreamSplitter::new("127.0.0.1", up_port, "127.0.0.1", 0, 7734).unwrap();
    splitter.run().await.unwrap();
    let port = splitter.local_addr().unwrap().port();

    let mut pdc = Pdc::new(7734, "127.0.0.1", port);
    pdc.run().await.unwrap();
    let header = pdc.get_header().await.unwrap().expect("no header from splitter");
    assert_eq!(header.header, "upstream source");

    splitter.stop();
    splitter.join().await;
    upstream.stop();
    upstream.join().await;
}

#[tokio::test]
async fn test_upstream_loss_drops_clients_and_reconnects() {
    let (upstream, up_port) = start_pmu(10).await;
    let splitter = StreamSplitter::new("127.0.0.1", up_port, "127.0.0.1", 0, 7734).unwrap();
    splitter.run().await.unwrap();
    let port = splitter.local_addr().unwrap().port();

    let mut pdc = Pdc::new(7734, "127.0.0.1", port);
    pdc.run().await.unwrap();
    pdc.get_config().await.unwrap().expect("no configuration");
    pdc.start().await.unwrap();
    assert!(timeout(Duration::from_secs(5), pdc.get()).await.unwrap().is_some());

    // Kill the upstream: the downstream socket must close.
    upstream.stop();
    upstream.join().await;
    let closed = timeout(Duration::from_secs(5), async {
        loop {
            if pdc.get().await.is_none() {
                return;
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "downstream client was not dropped on upstream loss");
    pdc.quit();

    // Bring the upstream back on the same port; the splitter reconnects
    // with backoff and serves new clients again.
    let (revived, _) = {
        let pmu = Arc::new(Pmu::new(7734, "127.0.0.1", up_port, "Station A", 10).unwrap());
        pmu.set_ieee_data_sample().unwrap();
        pmu.run().await.unwrap();
        let ticker = pmu.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(ticker.tick_interval());
            loop {
                interval.tick().await;
                if ticker.send_sample().is_err() {
                    break;
                }
            }
        });
        (pmu, up_port)
    };

    let mut recovered = false;
    for _ in 0..15 {
        sleep(Duration::from_secs(1)).await;
        let mut probe = Pdc::new(7734, "127.0.0.1", port);
        if probe.run().await.is_err() {
            continue;
        }
        probe.start().await.ok();
        if timeout(Duration::from_secs(2), probe.get())
            .await
            .ok()
            .flatten()
            .is_some()
        {
            recovered = true;
            probe.quit();
            break;
        }
        probe.quit();
    }
    assert!(recovered, "splitter did not recover after upstream restart");

    splitter.stop();
    splitter.join().await;
    revived.stop();
    revived.join().await;
}
