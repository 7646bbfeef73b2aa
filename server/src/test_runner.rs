#![cfg(test)]

//! This module runs test cases defined in `db/test/cases`.
//!
//! Each test case consists of two files, named in terms of `<name>`, the name of the test case:
//! * `<name>.graphql`: a GraphQL document to execute
//! * `<name>.json`: the expected `data` in the response
//!
//! This runner will scan that directory for all such pairs of files and, for each one, start a
//! server backed by a fresh, empty in-memory database, execute the document and make sure that
//! the response matches the expected response. Before comparing the expected and actual
//! responses, the test runner will sort every array, since the API does not guarantee the order
//! of lists of users.
//!
//! Use `cargo test -p user-api-server` to run the tests.

use super::serve;
use ansi_term::Color;
use anyhow::Error;
use async_std::task::{sleep, spawn};
use model::{init_logging, sql::MockDataSource};
use portpicker::pick_unused_port;
use serde_json::{json, Value};
use std::ffi::OsString;
use std::fmt::{self, Display, Formatter};
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use surf::{http::StatusCode, Client};

#[async_std::test]
async fn graphql_api_test_cases() -> Result<(), Error> {
    init_logging();

    // Discover test cases.
    let workspace = Path::new(env!("CARGO_MANIFEST_DIR")).parent().unwrap();
    let mut test_cases = workspace
        .join("db/test/cases")
        .read_dir()?
        .filter_map(|dirent| {
            let path = dirent.unwrap().path();
            if path.extension()?.to_str().unwrap() == "graphql" {
                Some(TestCase::new(&path).unwrap())
            } else {
                None
            }
        })
        .collect::<Vec<_>>();
    test_cases.sort_by(|a, b| a.name.cmp(&b.name));
    assert!(!test_cases.is_empty(), "no test cases found");

    // Each test case gets its own server, so that cases which sign up users do not affect each
    // other.
    let mut results = vec![];
    for test in test_cases {
        results.push(test.run().await);
    }
    for result in &results {
        println!("{}", result);
    }
    if results.iter().any(TestResult::failed) {
        Err(Error::msg(format!("{}", Color::Red.paint("tests failed"))))
    } else {
        println!("All test cases passed.");
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct TestCase {
    name: OsString,
    query: String,
    response: Value,
}

impl TestCase {
    fn new(query_path: impl AsRef<Path>) -> Result<Self, Error> {
        let query_path = query_path.as_ref();
        let name = query_path.file_stem().unwrap();
        let query_bytes = fs::read(query_path)?;
        let query = std::str::from_utf8(&query_bytes)?;
        let response_path = query_path.with_extension("json");
        let mut response = serde_json::from_reader(File::open(response_path)?)?;
        normalize_response(&mut response);
        Ok(Self {
            name: name.into(),
            query: query.into(),
            response,
        })
    }

    async fn run(self) -> TestResult {
        TestResult {
            name: self.name,
            failure: Self::do_test(self.query, self.response).await.err(),
        }
    }

    async fn do_test(query: String, expected_response: Value) -> Result<(), Error> {
        // Start a GraphQL server with an empty database.
        let users = Arc::new(MockDataSource::in_memory().await?);
        let port = pick_unused_port().ok_or_else(|| Error::msg("no free ports"))?;
        spawn(async move {
            if let Err(err) = serve(port, users).await {
                tracing::error!("server failed: {err}");
            }
            tracing::warn!("server exited");
        });

        // Connect a client.
        let client: Client = surf::Config::default()
            .set_base_url(format!("http://127.0.0.1:{port}").parse()?)
            .try_into()
            .unwrap();
        // Wait for the server to come up.
        wait_for_server(&client).await?;

        // Make the GraphQL request.
        let mut res = client
            .post("/graphql")
            .body_json(&json!({ "query": query }))
            .map_err(Error::msg)?
            .send()
            .await
            .map_err(Error::msg)?;
        if res.status() != StatusCode::Ok {
            return Err(Error::msg(format!(
                "query failed with status {}",
                res.status()
            )));
        }

        // Parse and normalize the response.
        let mut response: Value = res
            .body_json()
            .await
            .map_err(|err| Error::msg(format!("cannot parse reponse body as JSON: {err}")))?;
        normalize_response(&mut response);

        // Extract GraphQL errors.
        for error in response
            .get("errors")
            .and_then(|value| value.as_array())
            .into_iter()
            .flatten()
        {
            tracing::error!("GraphQL error: {error}");
        }

        // Extract GraphQL data.
        let data = response
            .get("data")
            .ok_or_else(|| Error::msg(format!("response is missing data: {response}")))?;
        if *data != expected_response {
            Err(Error::msg(format!(
                "expected response:\n{expected_response}\nactual response:\n{data}"
            )))
        } else {
            Ok(())
        }
    }
}

struct TestResult {
    name: OsString,
    failure: Option<anyhow::Error>,
}

impl TestResult {
    fn failed(&self) -> bool {
        self.failure.is_some()
    }
}

impl Display for TestResult {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}...", self.name.to_string_lossy())?;
        if let Some(err) = &self.failure {
            writeln!(f, "{}", Color::Red.paint("FAILED"))?;
            write!(f, "{err}")?;
        } else {
            write!(f, "{}", Color::Green.paint("OK"))?;
        }
        Ok(())
    }
}

async fn wait_for_server(client: &Client) -> Result<(), Error> {
    const MAX_CONNECT_RETRIES: usize = 60;

    for _ in 0..MAX_CONNECT_RETRIES {
        match client.get("/").await {
            Ok(_) => return Ok(()),
            Err(err) => {
                tracing::warn!("waiting for server to start: {err}");
                sleep(Duration::from_millis(100)).await;
            }
        }
    }

    Err(Error::msg("timed out waiting for server"))
}

fn normalize_response(res: &mut Value) {
    if let Some(obj) = res.as_object_mut() {
        for val in obj.values_mut() {
            normalize_response(val);
        }
    } else if let Some(arr) = res.as_array_mut() {
        for val in arr.iter_mut() {
            normalize_response(val);
        }
        arr.sort_by_key(|val| val.to_string());
    }
}

#[test]
fn test_normalize_response() {
    let mut res = json!({
        "allUsers": [
            { "id": 2, "email": "b" },
            { "id": 1, "email": "a" },
        ],
        "userById": null,
    });
    normalize_response(&mut res);
    assert_eq!(
        res,
        json!({
            "allUsers": [
                { "id": 1, "email": "a" },
                { "id": 2, "email": "b" },
            ],
            "userById": null,
        })
    );
}
