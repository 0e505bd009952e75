//! End-to-end client benchmarks against a loopback Bolt responder.

use boltwire_client::{connect, Client, ConnectionConfig, SecurityPlan, Statement};
use boltwire_protocol::version::BOLT_MAGIC;
use boltwire_protocol::{
    AuthToken, Decoder, Encoder, Metadata, Request, Response, TransactionMetadata, Value,
};
use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;

fn success(pairs: &[(&str, Value)]) -> Response {
    Response::Success(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<Metadata>(),
    )
}

/// Answers every request the way a healthy server would. A RUN's `rows`
/// parameter sets how many records the following PULL streams.
async fn serve(mut socket: TcpStream) {
    let mut preamble = [0u8; 20];
    if socket.read_exact(&mut preamble).await.is_err() || preamble[..4] != BOLT_MAGIC {
        return;
    }
    if socket.write_all(&[0, 0, 4, 5]).await.is_err() {
        return;
    }

    let mut decoder = Decoder::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut out = BytesMut::new();
    let mut rows = 0i64;
    loop {
        let n = match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        decoder.extend(&buf[..n]);
        while let Ok(Some(request)) = decoder.decode_request() {
            let responses = match request {
                Request::Hello { .. } => vec![success(&[
                    ("server", Value::from("Neo4j/5.20.0")),
                    ("connection_id", Value::from("bolt-bench")),
                ])],
                Request::Run { parameters, .. } => {
                    rows = match parameters.get("rows") {
                        Some(Value::Integer(rows)) => *rows,
                        _ => 1,
                    };
                    vec![success(&[("fields", Value::from(vec!["n"]))])]
                }
                Request::Pull { .. } => {
                    let mut responses: Vec<Response> =
                        (0..rows).map(|i| Response::Record(vec![Value::from(i)])).collect();
                    responses.push(success(&[("type", Value::from("r"))]));
                    responses
                }
                Request::Goodbye => return,
                _ => vec![success(&[])],
            };
            for response in &responses {
                let _ = Encoder::encode_response(response, &mut out);
            }
        }
        if socket.write_all(&out).await.is_err() {
            return;
        }
        out.clear();
    }
}

fn setup_client(rt: &Runtime) -> Client {
    rt.block_on(async {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(socket));
            }
        });

        let address = format!("127.0.0.1:{}", port).parse().unwrap();
        let conn = connect(
            &address,
            &SecurityPlan::Plaintext,
            None,
            &AuthToken::none(),
            &ConnectionConfig::new(),
        )
        .await
        .unwrap();
        Client::from_connection(conn)
    })
}

fn bench_reset_latency(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let client = setup_client(&rt);

    let mut group = c.benchmark_group("e2e_reset");
    group.throughput(Throughput::Elements(1));

    group.bench_function("reset", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(client.ping().await.unwrap()) });
    });

    group.finish();
}

fn bench_auto_commit_query(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let client = setup_client(&rt);
    let tx = TransactionMetadata::new();

    let mut group = c.benchmark_group("e2e_query");

    for rows in [1i64, 100, 1000] {
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |b, &rows| {
            b.to_async(&rt).iter(|| {
                let statement = Statement::new("UNWIND range(1, $rows) AS n RETURN n")
                    .with_parameter("rows", rows);
                let client = &client;
                let tx = &tx;
                async move { black_box(client.query(statement, tx).await.unwrap()) }
            });
        });
    }

    group.finish();
}

fn bench_transaction(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let client = setup_client(&rt);
    let tx = TransactionMetadata::new();

    let mut group = c.benchmark_group("e2e_transaction");
    group.throughput(Throughput::Elements(1));

    group.bench_function("begin_run_commit", |b| {
        b.to_async(&rt).iter(|| async {
            let statements = vec![Statement::new("CREATE (n) RETURN n").with_parameter("rows", 1)];
            black_box(client.transaction(&tx, statements).await.unwrap())
        });
    });

    group.finish();
}

fn bench_pipelined_requests(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let client = setup_client(&rt);

    let mut group = c.benchmark_group("e2e_pipelined");
    group.sample_size(20);

    for depth in [1, 10, 50] {
        group.throughput(Throughput::Elements(depth as u64));
        group.bench_with_input(BenchmarkId::new("resets", depth), &depth, |b, &depth| {
            b.to_async(&rt).iter(|| {
                let conn = client.connection();
                // All requests are written before the first response is read.
                let pending: Vec<_> = (0..depth).map(|i| conn.reset(i + 1 == depth)).collect();
                async move {
                    for reply in pending {
                        black_box(reply.await.unwrap());
                    }
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_reset_latency,
    bench_auto_commit_query,
    bench_transaction,
    bench_pipelined_requests,
);

criterion_main!(benches);
