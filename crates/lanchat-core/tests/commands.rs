mod common;

use std::sync::atomic::Ordering;

use common::{Harness, ME};
use lanchat_core::{Topic, TransferStatus};
use lanchat_shared::{MessageBody, MessageType, PeerCode};

#[tokio::test]
async fn test_send_to_unknown_user() {
    let h = Harness::logged_on("Me");

    h.engine.execute("/send Nobody somefile.txt");

    assert_eq!(
        h.chat.system_messages(),
        vec!["/send - no such user 'Nobody'".to_string()]
    );
    assert!(h.transport.sent().is_empty());
    assert!(h.transport.unicasts().is_empty());
}

#[tokio::test]
async fn test_send_argument_checks() {
    let h = Harness::logged_on("Me");
    h.add_peer(100, "Amy", "10.0.0.5");
    h.chat.clear();

    h.engine.execute("/send Amy");
    h.engine.execute("/send Me file.txt");
    h.engine.execute("/send Amy image.png");
    let dir = h.dir.path().display().to_string();
    h.engine.execute(&format!("/send Amy {}", dir));

    assert_eq!(
        h.chat.system_messages(),
        vec![
            "/send - missing arguments <nick> <file>".to_string(),
            "/send - no point in doing that!".to_string(),
            "/send - no such file 'image.png'".to_string(),
            format!("/send - no such file '{}'", dir),
        ]
    );
}

#[tokio::test]
async fn test_send_file_offers_it() {
    let h = Harness::logged_on("Me");
    h.add_peer(100, "Amy", "10.0.0.5");
    let path = h.dir.path().join("picture.png");
    std::fs::write(&path, vec![0u8; 2048]).unwrap();

    h.engine
        .execute(&format!("/send amy {}", path.display()));

    assert_eq!(
        h.chat.last_system_message().unwrap(),
        "Trying to send the file picture.png (#1) [2.00KB] to Amy"
    );
    let offers: Vec<_> = h
        .transport
        .sent()
        .into_iter()
        .filter_map(|m| match m.body {
            MessageBody::SendFile(offer) => Some(offer),
            _ => None,
        })
        .collect();
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].target, PeerCode(100));
    assert_eq!(offers[0].size, 2048);
    assert_eq!(offers[0].name, "picture.png");
    assert_eq!(h.engine.controller().transfers().senders().len(), 1);
}

#[tokio::test]
async fn test_receive_argument_checks() {
    let h = Harness::logged_on("Me");
    h.add_peer(100, "SomeOne", "10.0.0.5");
    h.chat.clear();

    for line in [
        "/receive",
        "/receive SomeOne",
        "/receive NoUser 1",
        "/receive Me 1",
        "/receive SomeOne monkey",
        "/receive SomeOne 1",
    ] {
        h.engine.execute(line);
    }

    assert_eq!(
        h.chat.system_messages(),
        vec![
            "/receive - missing arguments <nick> <id>",
            "/receive - wrong number of arguments: <nick> <id>",
            "/receive - no such user 'NoUser'",
            "/receive - no point in doing that!",
            "/receive - invalid file id argument: 'monkey'",
            "/receive - no file with id 1 offered by SomeOne",
        ]
    );
}

#[tokio::test]
async fn test_receive_accepts_and_renames_existing_file() {
    let h = Harness::logged_on("Me");
    h.add_peer(100, "SomeOne", "10.0.0.5");
    std::fs::write(h.dir.path().join("doc.pdf"), b"old").unwrap();
    h.receive(
        &format!("100!SENDFILE#SomeOne:({})[1024]{{99}}doc.pdf", ME.0),
        "10.0.0.5",
    );
    assert!(h
        .chat
        .has_system_message("SomeOne is trying to send the file doc.pdf (#1) [1.00KB]"));
    h.transport.clear();

    h.engine.execute("/receive SomeOne 1");

    assert!(h
        .chat
        .has_system_message("/receive - file 'doc.pdf' already exists - renaming to 'doc_1.pdf'"));
    assert_eq!(*h.pump.prepared.lock().unwrap(), vec![1]);

    let transfer = h.engine.controller().transfers().get(1).unwrap();
    assert_eq!(transfer.status, TransferStatus::Transferring);
    assert_eq!(transfer.path, h.dir.path().join("doc_1.pdf"));

    let accepts: Vec<_> = h
        .transport
        .sent()
        .into_iter()
        .filter_map(|m| match m.body {
            MessageBody::SendFileAccept(accept) => Some(accept),
            _ => None,
        })
        .collect();
    assert_eq!(accepts.len(), 1);
    assert_eq!(accepts[0].port, 50123);
    assert_eq!(accepts[0].hash, 99);

    h.engine.execute("/receive SomeOne 1");
    assert_eq!(
        h.chat.last_system_message().unwrap(),
        "/receive - already receiving 'doc.pdf' from SomeOne"
    );
}

#[tokio::test]
async fn test_reject_declines_offer() {
    let h = Harness::logged_on("Me");
    h.add_peer(100, "SomeOne", "10.0.0.5");
    h.receive(
        &format!("100!SENDFILE#SomeOne:({})[1024]{{99}}doc.pdf", ME.0),
        "10.0.0.5",
    );

    h.engine.execute("/reject SomeOne 1");

    assert!(h
        .chat
        .has_system_message("You declined to receive doc.pdf from SomeOne"));
    assert!(h.engine.controller().transfers().is_empty());
    assert_eq!(h.transport.count(MessageType::SendFileAbort), 1);
}

#[tokio::test]
async fn test_cancel() {
    let h = Harness::logged_on("Me");
    h.add_peer(100, "SomeOne", "10.0.0.5");
    h.chat.clear();
    h.receive(
        &format!("100!SENDFILE#SomeOne:({})[1024]{{99}}doc.pdf", ME.0),
        "10.0.0.5",
    );

    h.engine.execute("/cancel SomeOne 2");
    h.engine.execute("/cancel SomeOne 1");
    assert_eq!(
        h.chat.system_messages()[1..],
        [
            "/cancel - no file transfer with id 2 going on with SomeOne".to_string(),
            "/cancel - transfer of 'doc.pdf' from SomeOne has not started yet".to_string(),
        ]
    );

    let path = h.dir.path().join("upload.txt");
    std::fs::write(&path, b"data").unwrap();
    h.engine
        .execute(&format!("/send SomeOne {}", path.display()));
    h.transport.clear();

    h.engine.execute("/cancel SomeOne 2");

    assert_eq!(
        h.chat.last_system_message().unwrap(),
        "You cancelled sending of upload.txt to SomeOne"
    );
    assert_eq!(h.transport.count(MessageType::SendFileAbort), 1);
    assert!(h.engine.controller().transfers().senders().is_empty());
}

#[tokio::test]
async fn test_msg() {
    let h = Harness::logged_on("Me");
    h.add_peer(100, "SomeOne", "10.0.0.5");
    h.receive("101!LOGON#NoPort:", "10.0.0.6");
    h.chat.clear();

    h.engine.execute("/msg SomeOne");
    h.engine.execute("/msg NoOne hi");
    h.engine.execute("/msg Me hi");
    h.engine.execute("/msg NoPort hi");
    assert_eq!(
        h.chat.system_messages(),
        vec![
            "/msg - missing arguments <nick> <msg>",
            "/msg - no such user 'NoOne'",
            "/msg - no point in doing that!",
            "/msg - NoPort can't receive private chat messages",
        ]
    );

    h.engine.execute("/msg someone see you   at five");
    let unicasts = h.transport.unicasts();
    assert_eq!(unicasts.len(), 1);
    assert_eq!(unicasts[0].1.ip, "10.0.0.5");
    assert_eq!(unicasts[0].1.port, 40656);
    assert!(unicasts[0].0.ends_with("]see you at five"));
    assert!(h.chat.private_lines()[0].1.ends_with("<Me>: see you at five"));

    h.engine
        .controller()
        .settings()
        .set_private_chat_enabled(false)
        .unwrap();
    h.engine.execute("/msg SomeOne hi");
    assert_eq!(
        h.chat.last_system_message().unwrap(),
        "/msg - can't send private chat message when private chat is disabled"
    );
}

#[tokio::test]
async fn test_nick() {
    let h = Harness::logged_on("MySelf");
    h.add_peer(100, "Other", "10.0.0.5");
    h.chat.clear();

    for line in [
        "/nick",
        "/nick MySelf",
        "/nick other",
        "/nick @Boss",
        "/nick NewNick",
    ] {
        h.engine.execute(line);
    }

    assert_eq!(
        h.chat.system_messages(),
        vec![
            "/nick - missing argument <nick>",
            "/nick - you are already called 'MySelf'",
            "/nick - 'other' is in use by someone else",
            "/nick - '@Boss' is not a valid nick name. (1-10 letters)",
            "You changed nick to NewNick",
        ]
    );
    assert_eq!(h.engine.controller().me().nick, "NewNick");
    assert_eq!(h.engine.controller().settings().nick(), "NewNick");
    let nick_messages: Vec<_> = h
        .transport
        .sent()
        .into_iter()
        .filter(|m| m.message_type() == MessageType::Nick)
        .collect();
    assert_eq!(nick_messages.len(), 1);
    assert_eq!(nick_messages[0].nick, "NewNick");
}

#[tokio::test]
async fn test_away_and_back() {
    let h = Harness::logged_on("Me");

    h.engine.execute("/back");
    h.engine.execute("/away");
    h.engine.execute("/away Gone with the wind");
    h.engine.execute("/away again");
    h.engine.execute("/nick Other");
    h.engine.execute("hello?");
    h.engine.execute("/back");

    assert_eq!(
        h.chat.system_messages(),
        vec![
            "/back - you are not away",
            "/away - missing argument <away message>",
            "You went away: Gone with the wind",
            "/away - you are already away: 'Gone with the wind'",
            "You can not change nick while away",
            "You can not send a chat message while away",
            "You came back",
        ]
    );
    assert_eq!(h.transport.count(MessageType::Away), 1);
    assert_eq!(h.transport.count(MessageType::Back), 1);
    assert!(!h.engine.controller().me().away);
}

#[tokio::test]
async fn test_topic() {
    let h = Harness::logged_on("Me");

    h.engine.execute("/topic");
    h.engine.execute("/topic   new topic  ");
    h.engine.execute("/topic new topic");
    let topic = h.engine.controller().topic();
    assert_eq!(topic.text, "new topic");
    assert_eq!(topic.nick, "Me");

    h.engine.execute("/topic");
    h.engine.execute("/topic  ");

    let messages = h.chat.system_messages();
    assert_eq!(messages[0], "No topic set");
    assert_eq!(messages[1], "You changed the topic to: new topic");
    assert!(messages[2].starts_with("Topic is: new topic (set by Me at "));
    assert_eq!(messages[3], "You removed the topic");
    assert_eq!(messages.len(), 4);
    assert_eq!(h.transport.count(MessageType::Topic), 2);
}

#[tokio::test]
async fn test_whois() {
    let h = Harness::logged_on("Me");
    h.add_peer(100, "Amy", "10.0.0.81");
    h.receive("100!AWAY#Amy:Gone home", "10.0.0.81");
    h.chat.clear();

    h.engine.execute("/whois");
    h.engine.execute("/whois none");
    h.engine.execute("/whois amy");

    let messages = h.chat.system_messages();
    assert_eq!(messages[0], "/whois - missing argument <nick>");
    assert_eq!(messages[1], "/whois - no such user 'none'");
    let whois = h
        .chat
        .lines()
        .last()
        .unwrap()
        .split_once(" *** ")
        .unwrap()
        .1
        .to_string();
    assert!(whois.starts_with(
        "/whois - Amy (Away):\nIP address: 10.0.0.81\nClient: LanChat v0.1.0\nOperating System: linux\nOnline: 0 days, 00:00:0"
    ));
    assert!(whois.ends_with("\nAway message: Gone home"));
}

#[tokio::test]
async fn test_users_and_transfers() {
    let h = Harness::logged_on("MySelf");
    h.add_peer(100, "Zelda", "10.0.0.5");
    h.add_peer(101, "Amy", "10.0.0.6");
    h.chat.clear();

    h.engine.execute("/users");
    h.engine.execute("/transfers");
    h.receive(
        &format!("101!SENDFILE#Amy:({})[512000]{{5}}image.png", ME.0),
        "10.0.0.6",
    );
    h.engine.execute("/transfers");

    let messages = h.chat.system_messages();
    assert_eq!(messages[0], "Users: Amy, MySelf, Zelda");
    assert_eq!(messages[1], "File transfers: no active file transfers");
    assert_eq!(
        messages[3],
        "File transfers:\n- Receiving:\n  #1 image.png [500.00KB] (0%, 0.00KB/s) from Amy"
    );
}

#[tokio::test]
async fn test_misc_commands() {
    let h = Harness::logged_on("Me");

    h.engine.execute("/nope");
    h.engine.execute("/");
    h.engine.execute("/clear");
    h.engine.execute("/quit");
    h.engine.execute("/about");
    h.engine.execute("/help");

    let messages = h.chat.system_messages();
    assert_eq!(
        messages[0],
        "Unknown command 'nope'. Type /help for a list of commands"
    );
    assert_eq!(
        messages[1],
        "Unknown command ''. Type /help for a list of commands"
    );
    assert!(messages[2].starts_with("This is LanChat v"));
    assert!(messages[3].starts_with("LanChat commands:\n/about - information about LanChat\n"));
    assert!(messages[3].ends_with("//<text> - send the text as a normal message, with a single slash"));
    assert!(h.ui.cleared.load(Ordering::SeqCst));
    assert!(h.ui.quit.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_double_slash_sends_text() {
    let h = Harness::logged_on("Me");

    h.engine.execute("//usr/bin is where it is");

    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    match &sent[0].body {
        MessageBody::Msg(text) => assert_eq!(text.text, "/usr/bin is where it is"),
        other => panic!("unexpected message {other:?}"),
    }
    assert!(h.chat.lines()[0].ends_with("<Me>: /usr/bin is where it is"));
}

#[tokio::test]
async fn test_chat_message_checks() {
    let h = Harness::new("Me");
    h.engine.execute("hello");
    assert_eq!(
        h.chat.last_system_message().unwrap(),
        "You can not send a chat message without being connected"
    );

    let h = Harness::logged_on("Me");
    h.engine.execute("   ");
    h.engine.execute(&"x".repeat(451));
    assert_eq!(
        h.chat.system_messages(),
        vec![
            "You can not send an empty chat message",
            "You can not send a chat message with more than 450 bytes",
        ]
    );

    h.engine.execute(&"x".repeat(450));
    assert_eq!(h.transport.count(MessageType::Msg), 1);

    h.transport.fail.store(true, Ordering::SeqCst);
    h.engine.execute("lost");
    assert_eq!(
        h.chat.last_system_message().unwrap(),
        "Failed to send message: lost"
    );
}

#[tokio::test]
async fn test_topic_is_checked_against_current() {
    let h = Harness::logged_on("Me");
    h.engine
        .controller()
        .chat_state()
        .set_topic(Topic::new("same", "Amy", 10));

    h.engine.execute("/topic same");

    assert!(h.chat.system_messages().is_empty());
    assert_eq!(h.transport.count(MessageType::Topic), 0);
}
