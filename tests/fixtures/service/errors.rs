use httpkit::StatusError;

#[derive(Debug, StatusError)]
pub enum UserErr {
    /// user not found
    /// @zh 用户不存在
    NotFound = 404_000_001,
    /// forbidden
    /// @errTalk
    Forbidden = 403_000_001,
}

#[derive(Debug, StatusError)]
pub enum AuthErr {
    /// unauthorized
    Unauthorized = 401_000_001,
}
