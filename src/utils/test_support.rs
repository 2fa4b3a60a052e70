//! Helpers shared by the crate's integration tests.

/// Mock-server tests bind a localhost port; some sandboxes forbid that.
pub fn should_skip_mock_server() -> bool {
    match std::net::TcpListener::bind(("127.0.0.1", 0)) {
        Ok(_) => false,
        Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
            eprintln!("skipping mock server test: sandbox forbids binding to localhost");
            true
        }
        Err(err) => panic!("failed to bind localhost for mock server tests: {err}"),
    }
}

/// A few bytes that start like an ISO-BMFF (mp4) file.
pub fn sample_mp4() -> Vec<u8> {
    let mut out = vec![0u8, 0, 0, 0x18];
    out.extend_from_slice(b"ftypmp42");
    out.extend_from_slice(&[0; 12]);
    out
}
