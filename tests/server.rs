//! The HTTP endpoint over a real socket.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread::JoinHandle;

use image::DynamicImage;

use signtracking::classifier::{ClassifierModel, GestureClassifier};
use signtracking::config::ServerConfig;
use signtracking::endpoint::SingleShot;
use signtracking::features::FeatureVector;
use signtracking::hand_landmarks::{HandLandmarkDetector, LandmarkSet};
use signtracking::labels::{Label, LABEL_COUNT};
use signtracking::pipeline::StopHandle;
use signtracking::server::PredictServer;
use signtracking::Result;

/// Finds a hand only in images wider than they are tall.
struct LandscapeDetector;

impl HandLandmarkDetector for LandscapeDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Option<LandmarkSet>> {
        Ok((image.width() > image.height()).then(|| LandmarkSet::from_xy(&[(0.4, 0.6); 21])))
    }
}

struct AlwaysILoveYou;

impl ClassifierModel for AlwaysILoveYou {
    fn class_probabilities(&self, _features: &FeatureVector) -> Result<Vec<f32>> {
        let mut p = vec![0.01; LABEL_COUNT];
        p[Label::ILoveYou.index()] = 0.3;
        Ok(p)
    }
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::new_rgb8(width, height)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
        .unwrap();
    bytes
}

fn exchange(addr: SocketAddr, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.write_all(raw).unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    response
}

fn request(addr: SocketAddr, head: &str, body: &[u8]) -> String {
    let mut raw = format!(
        "{head}\r\nHost: localhost\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    raw.extend_from_slice(body);
    exchange(addr, &raw)
}

/// Body sent in `chunk`-sized pieces, without a Content-Length.
fn chunked_request(addr: SocketAddr, head: &str, body: &[u8], chunk: usize) -> String {
    let mut raw = format!(
        "{head}\r\nHost: localhost\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n"
    )
    .into_bytes();
    for piece in body.chunks(chunk) {
        raw.extend_from_slice(format!("{:x}\r\n", piece.len()).as_bytes());
        raw.extend_from_slice(piece);
        raw.extend_from_slice(b"\r\n");
    }
    raw.extend_from_slice(b"0\r\n\r\n");
    exchange(addr, &raw)
}

fn single_shot() -> SingleShot {
    SingleShot::new(
        Arc::new(LandscapeDetector),
        Arc::new(GestureClassifier::new(AlwaysILoveYou)),
    )
}

/// Start a server on an ephemeral port; returns its address and a stopper.
fn start(max_body_bytes: usize) -> (SocketAddr, StopHandle, JoinHandle<()>) {
    let config = ServerConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        workers: 2,
        max_body_bytes,
    };
    let server = PredictServer::bind(single_shot(), &config).unwrap();
    let addr = server.local_addr().unwrap();

    let stop = StopHandle::new();
    let worker_stop = stop.clone();
    let handle = std::thread::spawn(move || server.run(worker_stop));
    (addr, stop, handle)
}

#[test]
fn serves_predictions_until_stopped() {
    let (addr, stop, handle) = start(64 * 1024);

    let response = request(addr, "POST /predict HTTP/1.1", &png(8, 4));
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.contains("Access-Control-Allow-Origin: *"));
    assert!(response.ends_with(r#"{"prediction":"I Love you"}"#));

    let response = request(addr, "POST /predict HTTP/1.1", &png(4, 8));
    assert!(response.ends_with(r#"{"prediction":"No Hand Detected"}"#));

    let boundary = "XyZ";
    let mut body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"a.png\"\r\n\
         Content-Type: image/png\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(&png(8, 4));
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    let head = format!(
        "POST /predict HTTP/1.1\r\nContent-Type: multipart/form-data; boundary={boundary}"
    );
    let response = request(addr, &head, &body);
    assert!(response.ends_with(r#"{"prediction":"I Love you"}"#), "{response}");

    let response = request(addr, "GET /predict HTTP/1.1", b"");
    assert!(response.starts_with("HTTP/1.1 405"), "{response}");

    let response = request(addr, "GET /health HTTP/1.1", b"");
    assert!(response.starts_with("HTTP/1.1 404"), "{response}");

    stop.stop();
    handle.join().unwrap();
}

#[test]
fn oversized_bodies_are_rejected() {
    let (addr, stop, handle) = start(16);
    let body = [7u8; 100];

    let response = request(addr, "POST /predict HTTP/1.1", &body);
    assert!(response.starts_with("HTTP/1.1 413"), "{response}");
    assert!(response.ends_with(r#"{"error":"request body too large"}"#));

    let response = chunked_request(addr, "POST /predict HTTP/1.1", &body, 10);
    assert!(response.starts_with("HTTP/1.1 413"), "{response}");

    // a chunked body within the limit still reaches the handler
    let response = chunked_request(addr, "POST /predict HTTP/1.1", &body[..12], 5);
    assert!(response.starts_with("HTTP/1.1 400"), "{response}");

    stop.stop();
    handle.join().unwrap();
}
