pub mod notify;
pub mod supabase;

pub use supabase::{DbError, SupabaseClient};
