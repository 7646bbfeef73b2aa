//! The schema describing the entities and operations in the GraphQL API.

use crate::context::ContextExt;
use async_graphql::{
    Context, EmptySubscription, InputObject, InputValueError, InputValueResult, Object, Result,
    Scalar, ScalarType, Schema, SimpleObject, Value, ID,
};
use chrono::Utc;

/// A date and time in UTC.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateTime(pub chrono::DateTime<Utc>);

// Declared in the SDL but not yet used by any field. async-graphql leaves types that no field
// reaches out of introspection, so it is absent from `__schema`.
/// A date and time in UTC, formatted as an RFC 3339 string.
#[Scalar(name = "DateTime")]
impl ScalarType for DateTime {
    fn parse(value: Value) -> InputValueResult<Self> {
        match &value {
            Value::String(s) => Ok(Self(s.parse()?)),
            _ => Err(InputValueError::expected_type(value)),
        }
    }

    fn to_value(&self) -> Value {
        Value::String(self.0.to_rfc3339())
    }
}

/// The executable schema for the GraphQL API.
pub type ApiSchema = Schema<Query, Mutation, EmptySubscription>;

/// A registered user.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, SimpleObject)]
pub struct User {
    /// Identifier assigned when the user signed up.
    ///
    /// IDs are unique among all users and never change.
    pub id: i32,
    /// The address the user signed up with.
    pub email: String,
}

/// The information needed to sign up a new user.
#[derive(Clone, Debug, PartialEq, Eq, Hash, InputObject)]
pub struct UserCreateInput {
    /// The address to sign up with.
    ///
    /// This is not validated, and need not be unique.
    pub email: String,
}

/// Entrypoint for read-only GraphQL queries.
#[derive(Clone, Copy, Debug, Default)]
pub struct Query;

#[Object]
impl Query {
    /// All registered users, in no particular order.
    async fn all_users(&self, ctx: &Context<'_>) -> Result<Vec<User>> {
        Ok(ctx.users()?.find_many().await?)
    }

    /// The user with the given ID, or `null` if there is no such user.
    async fn user_by_id(&self, ctx: &Context<'_>, id: ID) -> Result<Option<User>> {
        // User IDs are integers, so any other ID cannot name a user.
        let Ok(id) = id.parse::<i32>() else {
            tracing::debug!(id = %id.as_str(), "non-integer user ID");
            return Ok(None);
        };
        Ok(ctx.users()?.find_unique(id).await?)
    }
}

/// Entrypoint for GraphQL mutations.
#[derive(Clone, Copy, Debug, Default)]
pub struct Mutation;

#[Object]
impl Mutation {
    /// Sign up a new user.
    ///
    /// Returns the full list of users after the new one has been added.
    async fn sign_up_user(&self, ctx: &Context<'_>, data: UserCreateInput) -> Result<Vec<User>> {
        let users = ctx.users()?;
        let user = users.create(data).await?;
        tracing::info!(id = user.id, "signed up user");
        Ok(users.find_many().await?)
    }
}

/// Create the schema for the GraphQL API.
pub fn generate() -> ApiSchema {
    Schema::build(Query, Mutation, EmptySubscription)
        .register_output_type::<DateTime>()
        .finish()
}
