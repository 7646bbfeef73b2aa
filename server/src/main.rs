use async_graphql::http::GraphiQLSource;
use async_graphql_tide::{receive_request, respond};
use clap::Parser;
use model::{
    backend::D,
    context::RequestContext,
    db, init_logging,
    schema::{self, ApiSchema},
};
use std::sync::Arc;
use tide::{http::mime, Request, Response, StatusCode};

mod test_runner;

/// Start the user API server.
#[derive(Clone, Debug, Parser)]
struct Options {
    /// The port where the app should be served.
    #[clap(short, long, env = "USER_API_PORT", default_value = "4000")]
    port: u16,

    /// Create the database tables on startup if they do not exist.
    #[clap(long, env = "USER_API_SETUP")]
    setup: bool,

    #[clap(flatten)]
    db: db::Options,
}

impl Options {
    async fn serve(&self) -> tide::Result<()> {
        let conn = self.db.connect().await?;
        if self.setup {
            db::setup(&conn).await?;
        }
        serve(self.port, Arc::new(conn)).await
    }
}

/// Shared state of the web server.
#[derive(Clone)]
struct State {
    schema: ApiSchema,
    users: D,
}

/// The web application serving the GraphQL API from `users`.
fn app(users: D) -> tide::Server<State> {
    let mut app = tide::with_state(State {
        schema: schema::generate(),
        users,
    });
    app.at("/graphql").get(graphql).post(graphql);
    app.at("/").get(graphiql);
    app
}

/// Serve the GraphQL API on `port`, backed by `users`.
async fn serve(port: u16, users: D) -> tide::Result<()> {
    let app = app(users);
    tracing::info!("server ready at http://localhost:{port}/graphql");
    app.listen(format!("0.0.0.0:{port}")).await?;
    Ok(())
}

/// Execute a GraphQL request.
///
/// Each request gets its own [`RequestContext`].
async fn graphql(req: Request<State>) -> tide::Result {
    let State { schema, users } = req.state().clone();
    let request = receive_request(req)
        .await?
        .data(RequestContext::new(users));
    respond(schema.execute(request).await)
}

/// An in-browser explorer for the GraphQL API.
async fn graphiql(_req: Request<State>) -> tide::Result {
    Ok(Response::builder(StatusCode::Ok)
        .body(GraphiQLSource::build().endpoint("/graphql").finish())
        .content_type(mime::HTML)
        .build())
}

#[async_std::main]
async fn main() -> tide::Result<()> {
    init_logging();
    Options::parse().serve().await
}

#[cfg(test)]
mod test {
    use super::*;
    use model::sql::MockDataSource;
    use serde_json::{json, Value};
    use tide::{
        http::{self, Method, Url},
        Body,
    };

    async fn test_app() -> tide::Server<State> {
        init_logging();
        app(Arc::new(MockDataSource::in_memory().await.unwrap()))
    }

    async fn post(app: &tide::Server<State>, body: Value) -> Value {
        let mut req = http::Request::new(
            Method::Post,
            Url::parse("http://localhost/graphql").unwrap(),
        );
        req.set_body(Body::from_json(&body).unwrap());
        let mut res: http::Response = app.respond(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::Ok);
        res.body_json().await.unwrap()
    }

    #[async_std::test]
    async fn test_get_query() {
        let app = test_app().await;
        let mut url = Url::parse("http://localhost/graphql").unwrap();
        url.query_pairs_mut()
            .append_pair("query", "{ allUsers { id email } }");
        let mut res: http::Response = app
            .respond(http::Request::new(Method::Get, url))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::Ok);
        let body: Value = res.body_json().await.unwrap();
        assert_eq!(body["data"], json!({ "allUsers": [] }));
    }

    #[async_std::test]
    async fn test_requests_share_data_source() {
        let app = test_app().await;
        let body = post(
            &app,
            json!({
                "query": "mutation SignUp($email: String!) { signUpUser(data: { email: $email }) { id email } }",
                "variables": { "email": "x@y.com" },
            }),
        )
        .await;
        assert_eq!(
            body["data"],
            json!({ "signUpUser": [{ "id": 1, "email": "x@y.com" }] })
        );

        let body = post(&app, json!({ "query": "{ userById(id: 1) { id email } }" })).await;
        assert_eq!(
            body["data"],
            json!({ "userById": { "id": 1, "email": "x@y.com" } })
        );
    }

    #[async_std::test]
    async fn test_error_envelope() {
        let app = test_app().await;
        let body = post(&app, json!({ "query": "{ userById { id } }" })).await;
        assert_eq!(body["data"], Value::Null);
        assert!(!body["errors"].as_array().unwrap().is_empty());
        assert!(body["errors"][0]["message"].is_string());
    }

    #[async_std::test]
    async fn test_graphiql() {
        let app = test_app().await;
        let mut res: http::Response = app
            .respond(http::Request::new(
                Method::Get,
                Url::parse("http://localhost/").unwrap(),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.content_type(), Some(mime::HTML));
        assert!(res.body_string().await.unwrap().contains("/graphql"));
    }
}
