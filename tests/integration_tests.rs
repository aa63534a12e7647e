
use std::time::Duration;

use tokio_stream::StreamExt;
use tonic::Code;

use flight_poll::config::DatasetConfig;
use flight_poll::proto::query_descriptor::Kind;
use flight_poll::proto::{Action, ListDatasetsRequest, QueryDescriptor, Ticket};
use flight_poll::query::{QueryCatalog, QueryClass};
use test_harness::{handle_of, ticket_of, TestServer};

#[tokio::test]
async fn test_poll_to_completion_over_grpc() {
    let server = TestServer::start_with(|config| {
        config.with_catalog(
            QueryCatalog::default()
                .with_class(QueryClass::new("quick", Duration::from_secs(1), 120)),
        )
    })
    .await;
    let mut client = server.client().await;

    let mut info = client
        .poll_query(QueryDescriptor {
            kind: Some(Kind::Query("quick".to_string())),
        })
        .await
        .unwrap()
        .into_inner();

    let mut polls = 0;
    while let Some(handle) = handle_of(&info) {
        polls += 1;
        assert!(polls < 50, "query never completed");
        tokio::time::sleep(Duration::from_millis(100)).await;
        info = client
            .poll_query(QueryDescriptor {
                kind: Some(Kind::PollHandle(handle)),
            })
            .await
            .unwrap()
            .into_inner();
    }
    assert_eq!(info.progress, Some(1.0));

    let location = &info.info.as_ref().unwrap().endpoints[0].locations[0];
    assert_eq!(location, &format!("grpc://{}", server.addr));

    let mut stream = client.do_get(ticket_of(&info)).await.unwrap().into_inner();
    let mut rows = 0;
    while let Some(batch) = stream.next().await {
        rows += batch.unwrap().values.len();
    }
    assert_eq!(rows, 120);

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_query_over_grpc() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    let err = client
        .poll_query(QueryDescriptor {
            kind: Some(Kind::Query("nope".to_string())),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);

    server.stop().await;
}

#[tokio::test]
async fn test_list_echo_and_fetch_over_grpc() {
    let server = TestServer::start_with(|config| {
        config.with_datasets(DatasetConfig {
            sample_delay: Duration::from_millis(200),
            ..DatasetConfig::default()
        })
    })
    .await;
    let mut client = server.client().await;

    let datasets: Vec<_> = client
        .list_datasets(ListDatasetsRequest {})
        .await
        .unwrap()
        .into_inner()
        .collect()
        .await;
    assert_eq!(datasets.len(), 2);

    let echoed = client
        .do_action(Action {
            r#type: "echo".to_string(),
            body: b"hello".to_vec(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(echoed.body, b"hello");

    let mut stream = client
        .do_get(Ticket {
            ticket: b"sample-delay".to_vec(),
        })
        .await
        .unwrap()
        .into_inner();
    let mut rows = 0;
    while let Some(batch) = stream.next().await {
        rows += batch.unwrap().values.len();
    }
    assert_eq!(rows, 10);

    server.stop().await;
}
