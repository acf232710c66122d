// @generated
// This file is @generated by prost-build.
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct MailTmpl {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub subject: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub body: ::prost::alloc::string::String,
    #[prost(string, repeated, tag = "5")]
    pub keys: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(string, tag = "6")]
    pub provider_email: ::prost::alloc::string::String,
    #[prost(int32, tag = "7")]
    pub status: i32,
}
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct GetMailTmplRequest {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetMailTmplResponse {
    #[prost(message, optional, tag = "1")]
    pub mail_tmpl: ::core::option::Option<MailTmpl>,
}
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct MailProvider {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub email: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub user_name: ::prost::alloc::string::String,
    #[prost(string, tag = "5")]
    pub password: ::prost::alloc::string::String,
    #[prost(string, tag = "6")]
    pub host: ::prost::alloc::string::String,
    #[prost(int32, tag = "7")]
    pub port: i32,
    #[prost(string, tag = "8")]
    pub encryption: ::prost::alloc::string::String,
    #[prost(string, tag = "9")]
    pub type_id: ::prost::alloc::string::String,
    #[prost(string, tag = "10")]
    pub created_by: ::prost::alloc::string::String,
    #[prost(string, tag = "11")]
    pub created_at: ::prost::alloc::string::String,
    #[prost(string, tag = "12")]
    pub updated_at: ::prost::alloc::string::String,
    #[prost(int32, tag = "13")]
    pub status: i32,
}
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct GetMailProviderRequest {
    #[prost(string, tag = "1")]
    pub email: ::prost::alloc::string::String,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetMailProviderResponse {
    #[prost(message, optional, tag = "1")]
    pub mail_provider: ::core::option::Option<MailProvider>,
}
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct UpdateMailHistoryRequest {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub subject: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub body: ::prost::alloc::string::String,
    #[prost(string, repeated, tag = "4")]
    pub tos: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(string, tag = "5")]
    pub data: ::prost::alloc::string::String,
    #[prost(string, tag = "6")]
    pub template_id: ::prost::alloc::string::String,
    #[prost(string, tag = "7")]
    pub email_provider: ::prost::alloc::string::String,
}
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct UpdateMailHistoryResponse {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
}
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct CreateStatusHistoryRequest {
    #[prost(string, tag = "1")]
    pub mail_history_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub status: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub message: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub created_at: ::prost::alloc::string::String,
}
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct CreateStatusHistoryResponse {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
}
include!("mail.v1.tonic.rs");
// @@protoc_insertion_point(module)
