use sdp::description::{
    ATTR_KEY_CONNECTION_SETUP, ATTR_KEY_FINGERPRINT, ATTR_KEY_ICE_PWD, ATTR_KEY_ICE_UFRAG,
};
use sdp::util::ConnectionRole;
use sdp::{MediaDescription, SessionDescription};

use crate::peer_connection::transport::dtls::fingerprint::RTCDtlsFingerprint;
use shared::error::{Error, Result};

/// validate_description checks a description before any of it is applied.
///
/// `counterpart` is the description of the other side already in place, if
/// any; the roles of matching media sections must not collide with it.
/// Rejected sections (port zero) are not checked.
pub(crate) fn validate_description(
    desc: &SessionDescription,
    counterpart: Option<&SessionDescription>,
) -> Result<()> {
    validate_no_key_line(desc)?;
    validate_fingerprints(desc)?;

    for (i, media) in desc.media_descriptions.iter().enumerate() {
        if media.is_rejected() {
            continue;
        }
        validate_media(desc, i, media)?;
    }

    validate_bundle_credentials(desc)?;

    if let Some(counterpart) = counterpart {
        validate_setup_against(desc, counterpart)?;
    }

    Ok(())
}

fn validate_no_key_line(desc: &SessionDescription) -> Result<()> {
    if desc.encryption_key.is_some()
        || desc
            .media_descriptions
            .iter()
            .any(|m| m.encryption_key.is_some())
    {
        return Err(Error::ErrSessionDescriptionKeyLine);
    }
    Ok(())
}

/// Exactly one of a session level fingerprint or one on every media section,
/// all of them equal.
fn validate_fingerprints(desc: &SessionDescription) -> Result<()> {
    let session = desc.attribute(ATTR_KEY_FINGERPRINT);
    let media: Vec<Option<&str>> = desc
        .media_descriptions
        .iter()
        .filter(|m| !m.is_rejected())
        .map(|m| m.attribute(ATTR_KEY_FINGERPRINT).flatten())
        .collect();

    if media.is_empty() && session.is_none() {
        return Ok(());
    }

    let fingerprint = match session {
        Some(session) => {
            if media.iter().any(|m| m.is_some()) {
                return Err(Error::ErrSessionDescriptionMixedFingerprints);
            }
            session.as_str()
        }
        None => {
            let mut fingerprint: Option<&str> = None;
            for value in &media {
                let Some(value) = value else {
                    return Err(Error::ErrSessionDescriptionNoFingerprint);
                };
                match fingerprint {
                    None => fingerprint = Some(value),
                    Some(first) => {
                        if RTCDtlsFingerprint::parse(first) != RTCDtlsFingerprint::parse(value) {
                            return Err(Error::ErrSessionDescriptionConflictingFingerprints);
                        }
                    }
                }
            }
            fingerprint.ok_or(Error::ErrSessionDescriptionNoFingerprint)?
        }
    };

    if RTCDtlsFingerprint::parse(fingerprint).is_none() {
        return Err(Error::ErrSessionDescriptionInvalidFingerprint);
    }
    Ok(())
}

fn media_or_session<'a>(
    desc: &'a SessionDescription,
    media: &'a MediaDescription,
    key: &str,
) -> Option<&'a str> {
    match media.attribute(key) {
        Some(value) => value,
        None => desc.attribute(key).map(|v| v.as_str()),
    }
    .filter(|v| !v.is_empty())
}

fn validate_media(desc: &SessionDescription, i: usize, media: &MediaDescription) -> Result<()> {
    if media.mid().is_none() {
        return Err(Error::ErrSessionDescriptionMissingMid(i));
    }
    if media_or_session(desc, media, ATTR_KEY_ICE_UFRAG).is_none() {
        return Err(Error::ErrSessionDescriptionMissingIceUfrag(i));
    }
    if media_or_session(desc, media, ATTR_KEY_ICE_PWD).is_none() {
        return Err(Error::ErrSessionDescriptionMissingIcePwd(i));
    }

    let Some(setup) = media_or_session(desc, media, ATTR_KEY_CONNECTION_SETUP) else {
        return Err(Error::ErrSessionDescriptionMissingSetup(i));
    };
    match ConnectionRole::from(setup) {
        ConnectionRole::Actpass | ConnectionRole::Active | ConnectionRole::Passive => Ok(()),
        _ => Err(Error::ErrSessionDescriptionInvalidSetup(
            i,
            setup.to_owned(),
        )),
    }
}

/// Every section named by the bundle group shares one ufrag/pwd pair.
fn validate_bundle_credentials(desc: &SessionDescription) -> Result<()> {
    let Some(group) = desc.bundle_group() else {
        return Ok(());
    };

    let mut credentials: Option<(Option<&str>, Option<&str>)> = None;
    for media in &desc.media_descriptions {
        if media.is_rejected() {
            continue;
        }
        let Some(mid) = media.mid() else {
            continue;
        };
        if !group.contains(&mid) {
            continue;
        }

        let current = (
            media_or_session(desc, media, ATTR_KEY_ICE_UFRAG),
            media_or_session(desc, media, ATTR_KEY_ICE_PWD),
        );
        match credentials {
            None => credentials = Some(current),
            Some(first) if first != current => {
                return Err(Error::ErrSessionDescriptionBundleCredentialsMismatch(
                    mid.to_owned(),
                ));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn setup_of(desc: &SessionDescription, media: &MediaDescription) -> ConnectionRole {
    media_or_session(desc, media, ATTR_KEY_CONNECTION_SETUP)
        .map(ConnectionRole::from)
        .unwrap_or_default()
}

fn validate_setup_against(desc: &SessionDescription, counterpart: &SessionDescription) -> Result<()> {
    for (i, (ours, theirs)) in desc
        .media_descriptions
        .iter()
        .zip(counterpart.media_descriptions.iter())
        .enumerate()
    {
        if ours.is_rejected() || theirs.is_rejected() {
            continue;
        }
        let a = setup_of(desc, ours);
        let b = setup_of(counterpart, theirs);
        let conflicting = matches!(
            (a, b),
            (ConnectionRole::Active, ConnectionRole::Active)
                | (ConnectionRole::Passive, ConnectionRole::Passive)
        );
        if conflicting {
            return Err(Error::ErrSessionDescriptionConflictingSetup(
                i,
                a.to_string(),
                b.to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    const FINGERPRINT: &str = "sha-256 9E:1F:AB:33:2E:11:BA:28:27:7E:C3:10:73:7B:CD:03:82:D3:87:A3:42:43:33:F2:A9:C5:2B:60:69:FE:E0:39";
    const OTHER_FINGERPRINT: &str = "sha-256 0A:1F:AB:33:2E:11:BA:28:27:7E:C3:10:73:7B:CD:03:82:D3:87:A3:42:43:33:F2:A9:C5:2B:60:69:FE:E0:39";

    struct Section {
        mid: &'static str,
        ufrag: &'static str,
        pwd: &'static str,
        setup: &'static str,
        fingerprint: Option<&'static str>,
        port: u16,
    }

    impl Default for Section {
        fn default() -> Self {
            Section {
                mid: "audio0",
                ufrag: "abcd",
                pwd: "0123456789012345678901",
                setup: "actpass",
                fingerprint: Some(FINGERPRINT),
                port: 9,
            }
        }
    }

    fn build(session: &[String], sections: &[Section]) -> SessionDescription {
        let mut sdp = "v=0\r\no=- 123 0 IN IP4 0.0.0.0\r\ns=-\r\nt=0 0\r\n".to_owned();
        for line in session {
            sdp += &format!("{line}\r\n");
        }
        for s in sections {
            sdp += &format!(
                "m=audio {} UDP/TLS/RTP/SAVPF 111\r\nc=IN IP4 0.0.0.0\r\n",
                s.port
            );
            if !s.setup.is_empty() {
                sdp += &format!("a=setup:{}\r\n", s.setup);
            }
            if !s.ufrag.is_empty() {
                sdp += &format!("a=ice-ufrag:{}\r\n", s.ufrag);
            }
            if !s.pwd.is_empty() {
                sdp += &format!("a=ice-pwd:{}\r\n", s.pwd);
            }
            if !s.mid.is_empty() {
                sdp += &format!("a=mid:{}\r\n", s.mid);
            }
            sdp += "a=rtpmap:111 opus/48000/2\r\n";
            if let Some(fingerprint) = s.fingerprint {
                sdp += &format!("a=fingerprint:{fingerprint}\r\n");
            }
        }
        SessionDescription::unmarshal(&mut Cursor::new(sdp.as_bytes())).unwrap()
    }

    #[test]
    fn test_validate_description() {
        let tests = vec![
            ("valid", vec![], vec![Section::default()], Ok(())),
            (
                "session fingerprint",
                vec![format!("a=fingerprint:{FINGERPRINT}")],
                vec![Section {
                    fingerprint: None,
                    ..Default::default()
                }],
                Ok(()),
            ),
            (
                "mixed fingerprints",
                vec![format!("a=fingerprint:{FINGERPRINT}")],
                vec![Section::default()],
                Err(Error::ErrSessionDescriptionMixedFingerprints),
            ),
            (
                "no fingerprint",
                vec![],
                vec![
                    Section::default(),
                    Section {
                        mid: "audio1",
                        fingerprint: None,
                        ..Default::default()
                    },
                ],
                Err(Error::ErrSessionDescriptionNoFingerprint),
            ),
            (
                "conflicting fingerprints",
                vec![],
                vec![
                    Section::default(),
                    Section {
                        mid: "audio1",
                        fingerprint: Some(OTHER_FINGERPRINT),
                        ..Default::default()
                    },
                ],
                Err(Error::ErrSessionDescriptionConflictingFingerprints),
            ),
            (
                "invalid fingerprint",
                vec![],
                vec![Section {
                    fingerprint: Some("sha-256"),
                    ..Default::default()
                }],
                Err(Error::ErrSessionDescriptionInvalidFingerprint),
            ),
            (
                "missing mid",
                vec![],
                vec![Section {
                    mid: "",
                    ..Default::default()
                }],
                Err(Error::ErrSessionDescriptionMissingMid(0)),
            ),
            (
                "missing ufrag",
                vec![],
                vec![Section {
                    ufrag: "",
                    ..Default::default()
                }],
                Err(Error::ErrSessionDescriptionMissingIceUfrag(0)),
            ),
            (
                "missing pwd",
                vec![],
                vec![Section {
                    pwd: "",
                    ..Default::default()
                }],
                Err(Error::ErrSessionDescriptionMissingIcePwd(0)),
            ),
            (
                "session credentials",
                vec!["a=ice-ufrag:abcd".to_owned(), "a=ice-pwd:0123456789012345678901".to_owned()],
                vec![Section {
                    ufrag: "",
                    pwd: "",
                    ..Default::default()
                }],
                Ok(()),
            ),
            (
                "missing setup",
                vec![],
                vec![Section {
                    setup: "",
                    ..Default::default()
                }],
                Err(Error::ErrSessionDescriptionMissingSetup(0)),
            ),
            (
                "invalid setup",
                vec![],
                vec![Section {
                    setup: "holdconn",
                    ..Default::default()
                }],
                Err(Error::ErrSessionDescriptionInvalidSetup(0, "holdconn".to_owned())),
            ),
            (
                "rejected section is skipped",
                vec![],
                vec![
                    Section::default(),
                    Section {
                        mid: "",
                        setup: "",
                        fingerprint: None,
                        port: 0,
                        ..Default::default()
                    },
                ],
                Ok(()),
            ),
            (
                "bundle shares credentials",
                vec!["a=group:BUNDLE audio0 audio1".to_owned()],
                vec![
                    Section::default(),
                    Section {
                        mid: "audio1",
                        ..Default::default()
                    },
                ],
                Ok(()),
            ),
            (
                "bundle credentials mismatch",
                vec!["a=group:BUNDLE audio0 audio1".to_owned()],
                vec![
                    Section::default(),
                    Section {
                        mid: "audio1",
                        ufrag: "efgh",
                        ..Default::default()
                    },
                ],
                Err(Error::ErrSessionDescriptionBundleCredentialsMismatch(
                    "audio1".to_owned(),
                )),
            ),
            (
                "unbundled sections may differ",
                vec![],
                vec![
                    Section::default(),
                    Section {
                        mid: "audio1",
                        ufrag: "efgh",
                        ..Default::default()
                    },
                ],
                Ok(()),
            ),
        ];

        for (name, session, sections, expected) in tests {
            let desc = build(&session, &sections);
            assert_eq!(validate_description(&desc, None), expected, "{name}");
        }
    }

    #[test]
    fn test_validate_key_line() {
        let sdp = "v=0\r\no=- 123 0 IN IP4 0.0.0.0\r\ns=-\r\nt=0 0\r\nk=clear:secret\r\n";
        let desc = SessionDescription::unmarshal(&mut Cursor::new(sdp.as_bytes())).unwrap();
        assert_eq!(
            validate_description(&desc, None),
            Err(Error::ErrSessionDescriptionKeyLine)
        );
    }

    #[test]
    fn test_validate_conflicting_setup() {
        let tests = vec![
            ("active", "active", true),
            ("passive", "passive", true),
            ("active", "passive", false),
            ("active", "actpass", false),
            ("actpass", "passive", false),
        ];

        for (ours, theirs, conflicting) in tests {
            let desc = build(
                &[],
                &[Section {
                    setup: ours,
                    ..Default::default()
                }],
            );
            let counterpart = build(
                &[],
                &[Section {
                    setup: theirs,
                    ..Default::default()
                }],
            );

            let result = validate_description(&desc, Some(&counterpart));
            if conflicting {
                assert_eq!(
                    result,
                    Err(Error::ErrSessionDescriptionConflictingSetup(
                        0,
                        ours.to_owned(),
                        theirs.to_owned()
                    ))
                );
            } else {
                assert_eq!(result, Ok(()), "{ours} {theirs}");
            }
        }
    }
}
