use crate::errors::UserErr;
use httpkit::{Method, Response, Router, StatusCode, StatusError};
use serde::Serialize;

#[derive(Serialize)]
pub enum Pet {
    /// cat
    CAT = 1,
    /// dog
    DOG = 0,
    /// fish
    FISH = 2,
}

/// A registered user.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    pub display_name: String,
    pub pet: Option<Pet>,
    pub manager: Option<Box<User>>,
}

/// List users
pub struct ListUsers {
    #[param(query, default = "10")]
    pub size: Option<u32>,
    #[param(query)]
    pub pet: Option<Pet>,
}

impl ListUsers {
    pub fn method(&self) -> &'static str {
        "GET"
    }

    pub fn output(&self) -> Result<Vec<User>, StatusError> {
        Ok(Vec::new())
    }
}

/// Get one user
pub struct GetUser {
    #[param(path)]
    pub id: u64,
}

impl GetUser {
    pub fn output(&self) -> Result<User, StatusError> {
        find(self.id)?;
        ensure_visible(self.id)?;
        Err(UserErr::NotFound.into())
    }
}

fn find(id: u64) -> Result<User, StatusError> {
    Err(UserErr::NotFound.into())
}

fn ensure_visible(id: u64) -> Result<(), StatusError> {
    if id == 0 {
        return Err(UserErr::NotFound.into());
    }
    Err(UserErr::Forbidden.into())
}

/// Create a user
pub struct CreateUser {
    #[param(body)]
    pub user: User,
}

impl CreateUser {
    pub fn method(&self) -> Method {
        Method::POST
    }

    pub fn output(&self) -> Result<User, StatusError> {
        Ok(Response::new(self.user.clone()).with_status(StatusCode::CREATED))
    }
}

pub struct Ghost {
    #[param(path)]
    pub id: u64,
}

pub struct Hidden;

pub fn mount(parent: &Router) {
    parent.register(router![Group::new("/users"), ListUsers]);
    parent.register(router![Group::new("/users"), CreateUser]);
    parent.register(router![Group::new("/users/:id"), GetUser]);
    parent.register(router![Group::new("/ghosts/:name"), Ghost]);
    nested(parent);
}

fn nested(parent: &Router) {
    parent.register(router![Hidden]);
}
