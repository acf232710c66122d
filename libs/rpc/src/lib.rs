// Checked-in buf output for proto/mail/v1/mail.proto.
// The prost file includes its tonic companion.

pub mod mail {
    include!("generated/mail/v1/mail.v1.rs");
}
