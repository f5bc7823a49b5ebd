use tonic::{Request, Response, Status};

use super::auth_service::{Authenticator, SUCCESS_MESSAGE, SignupForm};
use super::model::Role;
use super::service::UserManager;
use crate::auth::AuthenticatedUser;
use crate::user::{
    AuthResponse, GetUserByIdRequest, GetUserByUsernameRequest, ListUsersRequest,
    ListUsersResponse, LoginRequest, SignupRequest, User, admin_service_server::AdminService,
    auth_service_server::AuthService, user_service_server::UserService,
};

#[tonic::async_trait]
impl UserService for UserManager {
    async fn get_user_by_id(
        &self,
        request: Request<GetUserByIdRequest>,
    ) -> Result<Response<User>, Status> {
        let id = request.into_inner().id;
        tracing::info!(user_id = id, "Received request to get user by id");
        let user = self.find_by_id(id).await?;
        Ok(Response::new(user.to_proto()))
    }

    async fn get_user_by_username(
        &self,
        request: Request<GetUserByUsernameRequest>,
    ) -> Result<Response<User>, Status> {
        let username = request.into_inner().username;
        tracing::info!(username = %username, "Received request to get user by username");
        let user = self.find_by_username(&username).await?;
        Ok(Response::new(user.to_proto()))
    }
}

#[tonic::async_trait]
impl AuthService for Authenticator {
    async fn signup(
        &self,
        request: Request<SignupRequest>,
    ) -> Result<Response<AuthResponse>, Status> {
        let req = request.into_inner();
        let form = SignupForm {
            full_name: req.full_name,
            username: req.username,
            password: req.password,
        };
        let token = Authenticator::signup(self, form).await?;
        Ok(Response::new(AuthResponse {
            token,
            message: SUCCESS_MESSAGE.to_string(),
        }))
    }

    async fn login(&self, request: Request<LoginRequest>) -> Result<Response<AuthResponse>, Status> {
        let req = request.into_inner();
        let token = Authenticator::login(self, &req.username, &req.password).await?;
        Ok(Response::new(AuthResponse {
            token,
            message: SUCCESS_MESSAGE.to_string(),
        }))
    }
}

/// 管理接口，需要 ADMIN 角色
#[derive(Clone)]
pub struct AdminApi {
    users: UserManager,
}

impl AdminApi {
    pub fn new(users: UserManager) -> Self {
        Self { users }
    }
}

#[tonic::async_trait]
impl AdminService for AdminApi {
    async fn list_users(
        &self,
        request: Request<ListUsersRequest>,
    ) -> Result<Response<ListUsersResponse>, Status> {
        let caller = AuthenticatedUser::from_request(&request)?;
        caller.require_role(Role::Admin)?;

        let users = self
            .users
            .list_users()
            .await?
            .iter()
            .map(|u| u.to_proto())
            .collect();
        Ok(Response::new(ListUsersResponse { users }))
    }
}
