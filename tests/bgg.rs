use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use assert_matches::assert_matches;
use url::Url;

use shelf_shuffler::bgg::{
    BggClient, BggHttpClient, ReqwestTransport, Transport, UpstreamResponse,
};
use shelf_shuffler::config::{DEFAULT_USER_AGENT, RetryPolicy, UpstreamSettings};
use shelf_shuffler::domain::{GameId, Username};
use shelf_shuffler::error::ShelfError;

const ALICE_COLLECTION: &str = r#"<?xml version="1.0" encoding="utf-8" standalone="yes"?>
<items totalitems="1" termsofuse="https://boardgamegeek.com/xmlapi/termsofuse">
  <item objecttype="thing" objectid="13" subtype="boardgame" collid="1">
    <name sortindex="1">Catan</name>
    <yearpublished>1995</yearpublished>
    <image>https://cf.geekdo-images.com/catan.jpg</image>
    <thumbnail>https://cf.geekdo-images.com/catan_t.jpg</thumbnail>
    <status own="1" />
  </item>
</items>"#;

#[derive(Default)]
struct ScriptedTransport {
    responses: Mutex<VecDeque<UpstreamResponse>>,
    calls: Mutex<Vec<Url>>,
}

impl ScriptedTransport {
    fn new(responses: Vec<UpstreamResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<Url> {
        self.calls.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn get(&self, url: &Url) -> Result<UpstreamResponse, ShelfError> {
        self.calls.lock().unwrap().push(url.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ShelfError::UpstreamHttp("script exhausted".to_string()))
    }
}

fn ok(body: &str) -> UpstreamResponse {
    UpstreamResponse {
        status: 200,
        reason: "OK".to_string(),
        body: body.to_string(),
    }
}

fn processing() -> UpstreamResponse {
    UpstreamResponse {
        status: 202,
        reason: "Accepted".to_string(),
        body: "<message>Your request has been accepted</message>".to_string(),
    }
}

fn settings() -> UpstreamSettings {
    UpstreamSettings {
        base_url: "https://bgg.test/xmlapi2".to_string(),
        retry: RetryPolicy {
            max_retries: 5,
            delay: Duration::from_millis(2000),
        },
        ..UpstreamSettings::default()
    }
}

fn client(
    responses: Vec<UpstreamResponse>,
) -> (BggHttpClient<ScriptedTransport>, Arc<Mutex<Vec<Duration>>>) {
    let slept = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&slept);
    let client = BggHttpClient::with_transport(&settings(), ScriptedTransport::new(responses))
        .with_sleep(Arc::new(move |delay: Duration| recorder.lock().unwrap().push(delay)));
    (client, slept)
}

#[test]
fn fetch_collection_maps_items() {
    let (client, slept) = client(vec![ok(ALICE_COLLECTION)]);
    let username: Username = "alice".parse().unwrap();

    let items = client.fetch_collection(&username).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, "13");
    assert_eq!(items[0].name, "Catan");
    assert_eq!(items[0].year_published, Some(1995));
    assert_eq!(items[0].thumbnail, "https://cf.geekdo-images.com/catan_t.jpg");
    assert!(slept.lock().unwrap().is_empty());

    let calls = client.transport().calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].path(), "/xmlapi2/collection");
    assert_eq!(calls[0].query(), Some("username=alice&own=1"));
}

#[test]
fn collection_item_count_matches_document() {
    let body = format!(
        "<items>{}</items>",
        (1..=7)
            .map(|id| format!(r#"<item objectid="{id}"><name>Game {id}</name></item>"#))
            .collect::<String>()
    );
    let (client, _) = client(vec![ok(&body)]);
    let items = client
        .fetch_collection(&"bob".parse().unwrap())
        .unwrap();
    assert_eq!(items.len(), 7);
    assert_eq!(items[6].id, "7");
    assert_eq!(items[6].year_published, None);
}

#[test]
fn single_processing_response_is_retried() {
    let (client, slept) = client(vec![processing(), ok(ALICE_COLLECTION)]);
    let items = client
        .fetch_collection(&"alice".parse().unwrap())
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(client.transport().calls().len(), 2);
    assert_eq!(*slept.lock().unwrap(), vec![Duration::from_millis(2000)]);
}

#[test]
fn processing_budget_is_bounded() {
    let (client, slept) = client(vec![processing(); 7]);
    let err = client
        .fetch_collection(&"alice".parse().unwrap())
        .unwrap_err();

    assert!(err.is_upstream_unavailable());
    assert_matches!(err.root(), ShelfError::StillProcessing { attempts: 6 });
    assert_eq!(client.transport().calls().len(), 6);
    assert_eq!(slept.lock().unwrap().len(), 5);
}

#[test]
fn terminal_status_fails_without_retry() {
    let (client, slept) = client(vec![UpstreamResponse {
        status: 500,
        reason: "Internal Server Error".to_string(),
        body: String::new(),
    }]);
    let err = client
        .fetch_collection(&"alice".parse().unwrap())
        .unwrap_err();

    assert_matches!(err, ShelfError::CollectionFetch { ref username, .. } if username == "alice");
    assert_matches!(err.root(), ShelfError::UpstreamStatus { status: 500, .. });
    assert_eq!(
        err.to_string(),
        "failed to fetch collection for alice: BGG returned status 500: Internal Server Error"
    );
    assert!(slept.lock().unwrap().is_empty());
}

#[test]
fn error_document_is_malformed_payload() {
    let (client, _) = client(vec![ok(
        "<errors><error><message>Invalid username specified</message></error></errors>",
    )]);
    let err = client
        .fetch_collection(&"ghost".parse().unwrap())
        .unwrap_err();
    assert_matches!(err.root(), ShelfError::MalformedPayload(_));
}

#[test]
fn broken_xml_is_upstream_unavailable() {
    let (client, _) = client(vec![ok("<items><item objectid=\"1\">")]);
    let err = client
        .fetch_collection(&"alice".parse().unwrap())
        .unwrap_err();
    assert!(err.is_upstream_unavailable());
}

#[test]
fn batch_details_use_one_joined_request() {
    let body = r#"<items><item id="13"/><item id="822"/></items>"#;
    let (client, _) = client(vec![ok(body)]);
    let ids: Vec<GameId> = vec!["13".parse().unwrap(), "822".parse().unwrap()];

    let items = client.fetch_item_details(&ids).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[1].attr("id"), Some("822"));

    let calls = client.transport().calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].path(), "/xmlapi2/thing");
    assert_eq!(calls[0].query(), Some("id=13%2C822&stats=1"));
}

#[test]
fn empty_id_list_skips_the_request() {
    let (client, _) = client(Vec::new());
    assert!(client.fetch_item_details(&[]).unwrap().is_empty());
    assert!(client.transport().calls().is_empty());
}

#[test]
fn detail_failures_name_the_ids() {
    let (client, _) = client(vec![UpstreamResponse {
        status: 404,
        reason: String::new(),
        body: String::new(),
    }]);
    let ids: Vec<GameId> = vec!["13".parse().unwrap(), "822".parse().unwrap()];
    let err = client.fetch_item_details(&ids).unwrap_err();
    assert_eq!(
        err.to_string(),
        "failed to fetch game details for 13,822: BGG returned status 404: BGG request failed"
    );
}

#[test]
fn transport_error_is_not_retried() {
    // Empty script: the first get fails with UpstreamHttp.
    let (client, slept) = client(Vec::new());
    let err = client
        .fetch_collection(&"alice".parse().unwrap())
        .unwrap_err();

    assert_matches!(err.root(), ShelfError::UpstreamHttp(_));
    assert_eq!(client.transport().calls().len(), 1);
    assert!(slept.lock().unwrap().is_empty());
}

#[test]
fn collection_fields_are_kept_verbatim() {
    let body = r#"<items><item objectid="13">
        <name><![CDATA[Catan ]]></name>
        <image><![CDATA[ https://img.test/13.jpg]]></image>
        <thumbnail>https://img.test/13_t.jpg?v=2&amp;s=1</thumbnail>
    </item></items>"#;
    let (client, _) = client(vec![ok(body)]);
    let items = client
        .fetch_collection(&"alice".parse().unwrap())
        .unwrap();
    assert_eq!(items[0].name, "Catan ");
    assert_eq!(items[0].image, " https://img.test/13.jpg");
    assert_eq!(items[0].thumbnail, "https://img.test/13_t.jpg?v=2&s=1");
}

/// Serves one request on a local port and returns the lowercased request
/// head.
fn capture_request_head(settings: UpstreamSettings) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut head = String::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            if line == "\r\n" || line.is_empty() {
                break;
            }
            head.push_str(&line);
        }
        let mut stream = stream;
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 8\r\nConnection: close\r\n\r\n<items/>")
            .unwrap();
        head.to_lowercase()
    });

    let transport = ReqwestTransport::new(&settings).unwrap();
    let url = Url::parse(&format!("http://{addr}/xmlapi2/collection?username=alice")).unwrap();
    let response = transport.get(&url).unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, "<items/>");
    server.join().unwrap()
}

#[test]
fn requests_carry_user_agent_without_token() {
    let head = capture_request_head(UpstreamSettings::default());
    let expected = format!("user-agent: {}", DEFAULT_USER_AGENT.to_lowercase());
    assert!(head.contains(&expected), "{head}");
    assert!(!head.contains("authorization:"), "{head}");
}

#[test]
fn configured_token_is_sent_as_bearer() {
    let head = capture_request_head(UpstreamSettings {
        api_token: Some("secret-token".to_string()),
        ..UpstreamSettings::default()
    });
    assert!(head.contains("authorization: bearer secret-token"), "{head}");
    assert!(head.contains("user-agent: shelfshuffler"), "{head}");
}
