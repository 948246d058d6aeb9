pub mod content_utils;
pub mod header_utils;
pub mod playlist_utils;
pub mod referer_utils;
pub mod response_utils;
pub mod url_guard_utils;
