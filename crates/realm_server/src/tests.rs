use crate::doodad::FuncDispatch;
use crate::*;
use bytes::Bytes;
use realm_protocol::packets::{
    CSActiveWeaponChanged, CSUseDoodad, SCActiveWeaponChanged, SCDoodadPhaseChanged, SCErrorMsg,
};
use realm_protocol::{
    ErrorMessageType, Frame, FrameHeader, FrameReader, FrameWriter, InboundPacket, OutboundPacket,
    Packet, ProtocolError, RevisionRange, HEADER_SIZE,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing_subscriber::layer::SubscriberExt;

fn harness() -> (Arc<InMemoryWorld>, Arc<ServerContext>, DispatchTable) {
    let world = Arc::new(InMemoryWorld::new(50.0));
    let server = Arc::new(ServerContext::new(
        world.clone(),
        Arc::new(DoodadFuncRegistry::with_builtins()),
    ));
    (world, server, handlers::default_table().unwrap())
}

fn join(
    world: &InMemoryWorld,
    server: &Arc<ServerContext>,
    position: Position,
) -> (HandlerContext, mpsc::Receiver<Bytes>, EntityHandle) {
    join_at_revision(world, server, position, 1)
}

fn join_at_revision(
    world: &InMemoryWorld,
    server: &Arc<ServerContext>,
    position: Position,
    revision: u8,
) -> (HandlerContext, mpsc::Receiver<Bytes>, EntityHandle) {
    let (session, rx) = server
        .manager
        .add_session("127.0.0.1:6000".parse().unwrap(), revision, 64);
    let unit = world.spawn_unit(position).unwrap();
    server.manager.attach_entity(&session, unit).unwrap();
    (HandlerContext::new(session, server.clone()), rx, unit)
}

fn frame_of<P: OutboundPacket>(packet: &P) -> Frame {
    packet.to_frame().unwrap()
}

fn decode<P: InboundPacket>(bytes: &[u8]) -> P {
    let mut raw = [0u8; HEADER_SIZE];
    raw.copy_from_slice(&bytes[..HEADER_SIZE]);
    let header = FrameHeader::decode(&raw);
    assert_eq!(header.opcode, P::OPCODE, "unexpected opcode");
    assert_eq!(usize::from(header.payload_len), bytes.len() - HEADER_SIZE);
    P::decode_frame(&bytes[HEADER_SIZE..]).unwrap()
}

#[derive(Clone, Default)]
struct EventCounter(Arc<AtomicUsize>);

impl EventCounter {
    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for EventCounter {
    fn on_event(
        &self,
        _event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct CountingFunc {
    calls: AtomicUsize,
}

impl DoodadFunc for CountingFunc {
    fn use_func(
        &self,
        _ctx: &doodad::FuncContext<'_>,
        _caster: EntityHandle,
        _owner: EntityHandle,
        _skill_id: u32,
    ) -> Result<(), ErrorMessageType> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct CooldownFunc;

impl DoodadFunc for CooldownFunc {
    fn use_func(
        &self,
        _ctx: &doodad::FuncContext<'_>,
        _caster: EntityHandle,
        _owner: EntityHandle,
        _skill_id: u32,
    ) -> Result<(), ErrorMessageType> {
        Err(ErrorMessageType::SkillCooldown)
    }
}

#[tokio::test]
async fn unknown_opcode_is_dropped_and_next_frame_still_handled() {
    let (world, server, table) = harness();
    let (ctx, mut rx, unit) = join(&world, &server, Position::default());

    let outcome = table.dispatch(&ctx, &Frame::new(0x0777, 1, vec![1u8, 2, 3]));
    assert_eq!(
        outcome,
        DispatchOutcome::UnknownOpcode {
            opcode: 0x0777,
            revision: 1
        }
    );
    assert!(!ctx.session().is_closed());

    let outcome = table.dispatch(&ctx, &frame_of(&CSActiveWeaponChanged { active_weapon: 2 }));
    assert_eq!(outcome, DispatchOutcome::Handled);
    assert_eq!(world.active_weapon(unit), Some(2));
    let echoed: SCActiveWeaponChanged = decode(&rx.try_recv().unwrap());
    assert_eq!(echoed.active_weapon, 2);
}

#[test]
fn decode_failures_never_reach_the_handler() {
    let (world, server, _) = harness();
    let (ctx, _rx, _) = join(&world, &server, Position::default());
    let calls = Arc::new(AtomicUsize::new(0));

    let mut table = DispatchTable::new();
    {
        let calls = calls.clone();
        table
            .register::<CSActiveWeaponChanged, _>(move |_ctx, _packet| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
    }

    let empty = Frame::new(CSActiveWeaponChanged::OPCODE, 1, Vec::<u8>::new());
    assert!(matches!(
        table.dispatch(&ctx, &empty),
        DispatchOutcome::DecodeFailed(ProtocolError::TruncatedFrame { .. })
    ));

    let trailing = Frame::new(CSActiveWeaponChanged::OPCODE, 1, vec![1u8, 0]);
    assert!(matches!(
        table.dispatch(&ctx, &trailing),
        DispatchOutcome::DecodeFailed(ProtocolError::MalformedField { .. })
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let good = frame_of(&CSActiveWeaponChanged { active_weapon: 1 });
    assert_eq!(table.dispatch(&ctx, &good), DispatchOutcome::Handled);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn revision_ranges_route_by_session_revision_and_may_not_overlap() {
    let (world, server, _) = harness();
    let (ctx_v2, _rx2, _) = join_at_revision(&world, &server, Position::default(), 2);
    let (ctx_v4, _rx4, _) = join_at_revision(&world, &server, Position::default(), 4);
    let (ctx_v6, _rx6, _) = join_at_revision(&world, &server, Position::default(), 6);
    let old = Arc::new(AtomicUsize::new(0));
    let new = Arc::new(AtomicUsize::new(0));

    let mut table = DispatchTable::new();
    {
        let old = old.clone();
        table
            .register_range::<CSActiveWeaponChanged, _>(RevisionRange::new(1, 2), move |_, _| {
                old.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
    }
    {
        let new = new.clone();
        table
            .register_range::<CSActiveWeaponChanged, _>(RevisionRange::new(3, 5), move |_, _| {
                new.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
    }
    let overlap = table.register_range::<CSActiveWeaponChanged, _>(RevisionRange::new(5, 9), |_, _| Ok(()));
    assert!(matches!(overlap, Err(DispatchError::OverlappingRoute { .. })));
    assert_eq!(table.len(), 2);

    let opcode = CSActiveWeaponChanged::OPCODE;
    assert_eq!(
        table.dispatch(&ctx_v2, &Frame::new(opcode, 2, vec![0u8])),
        DispatchOutcome::Handled
    );
    assert_eq!(
        table.dispatch(&ctx_v4, &Frame::new(opcode, 4, vec![0u8])),
        DispatchOutcome::Handled
    );
    assert_eq!(
        table.dispatch(&ctx_v6, &Frame::new(opcode, 6, vec![0u8])),
        DispatchOutcome::UnknownOpcode {
            opcode,
            revision: 6
        }
    );
    assert!(!table.has_route(opcode, 6));

    // The session's revision decides; a frame stamped otherwise is dropped.
    assert_eq!(
        table.dispatch(&ctx_v2, &Frame::new(opcode, 4, vec![0u8])),
        DispatchOutcome::RevisionMismatch {
            session: 2,
            frame: 4
        }
    );
    assert_eq!(old.load(Ordering::SeqCst), 1);
    assert_eq!(new.load(Ordering::SeqCst), 1);
}

#[test]
fn server_packets_cannot_be_routed() {
    let mut table = DispatchTable::new();
    let result = table.register::<SCErrorMsg, _>(|_, _| Ok(()));
    assert!(matches!(result, Err(DispatchError::NotInbound { .. })));
    assert!(table.is_empty());
}

#[tokio::test]
async fn weapon_change_updates_unit_and_reaches_observers_including_sender() {
    let (world, server, table) = harness();
    let (ctx_a, mut rx_a, e1) = join(&world, &server, Position::new(0.0, 0.0, 0.0));
    let (_ctx_b, mut rx_b, _) = join(&world, &server, Position::new(10.0, 0.0, 0.0));
    let (_ctx_c, mut rx_c, _) = join(&world, &server, Position::new(500.0, 0.0, 0.0));

    let outcome = table.dispatch(&ctx_a, &frame_of(&CSActiveWeaponChanged { active_weapon: 3 }));
    assert_eq!(outcome, DispatchOutcome::Handled);
    assert_eq!(world.active_weapon(e1), Some(3));

    let expected = SCActiveWeaponChanged {
        object_id: world.object_id(e1).unwrap(),
        active_weapon: 3,
    };
    assert_eq!(decode::<SCActiveWeaponChanged>(&rx_a.try_recv().unwrap()), expected);
    assert_eq!(decode::<SCActiveWeaponChanged>(&rx_b.try_recv().unwrap()), expected);
    assert!(rx_c.try_recv().is_err());
}

#[tokio::test]
async fn fan_out_survives_one_broken_recipient() {
    let (world, server, table) = harness();
    let (ctx_a, mut rx_a, _) = join(&world, &server, Position::default());
    let (ctx_b, rx_b, unit_b) = join(&world, &server, Position::default());
    let (_ctx_c, mut rx_c, _) = join(&world, &server, Position::default());
    drop(rx_b);

    let outcome = table.dispatch(&ctx_a, &frame_of(&CSActiveWeaponChanged { active_weapon: 1 }));
    assert_eq!(outcome, DispatchOutcome::Handled);

    assert!(rx_a.try_recv().is_ok());
    assert!(rx_c.try_recv().is_ok());
    assert!(ctx_b.session().is_closed());
    assert!(!world.contains(unit_b));
    assert!(server.manager.get(ctx_b.session().id()).is_none());
    assert_eq!(server.manager.len(), 2);

    // The broken connection is gone; the next broadcast only sees two.
    let report = ctx_a
        .broadcast(
            &SCActiveWeaponChanged {
                object_id: 1,
                active_weapon: 0,
            },
            ctx_a.require_entity().unwrap(),
            true,
        )
        .unwrap();
    assert_eq!(report, BroadcastReport { delivered: 2, failed: 0 });
}

#[tokio::test]
async fn error_notification_goes_to_originator_only() {
    let (world, server, table) = harness();
    let (ctx_a, mut rx_a, _) = join(&world, &server, Position::default());
    let (_ctx_b, mut rx_b, _) = join(&world, &server, Position::default());

    let missing = CSUseDoodad {
        doodad_id: 0x00ab_cdef,
        skill_id: 9,
    };
    let outcome = table.dispatch(&ctx_a, &frame_of(&missing));
    assert_eq!(
        outcome,
        DispatchOutcome::Rejected(HandlerError::domain(
            ErrorMessageType::DoodadNotFound,
            0x00ab_cdef
        ))
    );

    let bytes = rx_a.try_recv().unwrap();
    let msg: SCErrorMsg = decode(&bytes);
    assert_eq!(msg, SCErrorMsg::new(ErrorMessageType::DoodadNotFound, 0x00ab_cdef, true));
    let code = ErrorMessageType::DoodadNotFound.code().to_le_bytes();
    assert_eq!(&bytes[HEADER_SIZE..HEADER_SIZE + 4], &[code[0], code[1], code[0], code[1]]);
    assert!(rx_b.try_recv().is_err());
    assert!(!ctx_a.session().is_closed());
}

#[tokio::test]
async fn using_a_unit_as_a_doodad_is_refused() {
    let (world, server, table) = harness();
    let (ctx, mut rx, _) = join(&world, &server, Position::default());
    let (_other, mut other_rx, other_unit) = join(&world, &server, Position::new(1.0, 0.0, 0.0));
    let target = world.object_id(other_unit).unwrap();

    let outcome = table.dispatch(
        &ctx,
        &frame_of(&CSUseDoodad {
            doodad_id: target,
            skill_id: 0,
        }),
    );
    assert_eq!(
        outcome,
        DispatchOutcome::Rejected(HandlerError::domain(ErrorMessageType::DoodadNotFound, target))
    );
    let msg: SCErrorMsg = decode(&rx.try_recv().unwrap());
    assert_eq!(msg.error, ErrorMessageType::DoodadNotFound);
    assert_eq!(msg.context, target);
    assert!(other_rx.try_recv().is_err());
    assert!(world.contains(other_unit));
}

#[tokio::test]
async fn doodad_out_of_reach_is_refused() {
    let (world, server, table) = harness();
    let (ctx, mut rx, _) = join(&world, &server, Position::default());
    let doodad = world
        .spawn_doodad(
            Position::new(400.0, 0.0, 0.0),
            0,
            vec![DoodadFuncBinding::new(DoodadFuncKind::PHASE_CHANGE, 0).with_param(2)],
        )
        .unwrap();

    let packet = CSUseDoodad {
        doodad_id: world.object_id(doodad).unwrap(),
        skill_id: 0,
    };
    table.dispatch(&ctx, &frame_of(&packet));

    let msg: SCErrorMsg = decode(&rx.try_recv().unwrap());
    assert_eq!(msg.error, ErrorMessageType::TooFarAway);
    assert_eq!(world.doodad_phase(doodad), Some(0));
}

#[tokio::test]
async fn phase_change_func_updates_doodad_and_notifies_observers() {
    let (world, server, table) = harness();
    let (ctx, mut rx, _) = join(&world, &server, Position::default());
    let doodad = world
        .spawn_doodad(
            Position::new(1.0, 0.0, 0.0),
            0,
            vec![
                DoodadFuncBinding::new(DoodadFuncKind::USE, 0),
                DoodadFuncBinding::new(DoodadFuncKind::PHASE_CHANGE, 0).with_param(7),
            ],
        )
        .unwrap();
    let object_id = world.object_id(doodad).unwrap();

    let outcome = table.dispatch(
        &ctx,
        &frame_of(&CSUseDoodad {
            doodad_id: object_id,
            skill_id: 0,
        }),
    );
    assert_eq!(outcome, DispatchOutcome::Handled);
    assert_eq!(world.doodad_phase(doodad), Some(7));

    let changed: SCDoodadPhaseChanged = decode(&rx.try_recv().unwrap());
    assert_eq!(changed, SCDoodadPhaseChanged { object_id, phase: 7 });
}

#[tokio::test]
async fn registered_kind_runs_only_for_matching_skill() {
    let (world, server, table) = harness();
    let (ctx, mut rx, _) = join(&world, &server, Position::default());
    let custom = DoodadFuncKind(77);
    let func = Arc::new(CountingFunc::default());
    assert!(server.doodads.register(custom, func.clone()).is_none());

    let doodad = world
        .spawn_doodad(
            Position::default(),
            0,
            vec![
                DoodadFuncBinding::new(custom, 5),
                DoodadFuncBinding::new(custom, 6),
                DoodadFuncBinding::new(custom, 0),
            ],
        )
        .unwrap();
    let doodad_id = world.object_id(doodad).unwrap();

    table.dispatch(&ctx, &frame_of(&CSUseDoodad { doodad_id, skill_id: 5 }));
    assert_eq!(func.calls.load(Ordering::SeqCst), 2);

    server.doodads.register(custom, Arc::new(CooldownFunc));
    let outcome = table.dispatch(&ctx, &frame_of(&CSUseDoodad { doodad_id, skill_id: 5 }));
    assert_eq!(
        outcome,
        DispatchOutcome::Rejected(HandlerError::domain(ErrorMessageType::SkillCooldown, 5))
    );
    let msg: SCErrorMsg = decode(&rx.try_recv().unwrap());
    assert_eq!(msg.error, ErrorMessageType::SkillCooldown);
    assert_eq!(msg.context, 5);
    assert_eq!(func.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn unregistered_kind_is_a_no_op_with_one_log_event() {
    let (world, server, table) = harness();
    let (ctx, mut rx, caster) = join(&world, &server, Position::default());
    let doodad = world
        .spawn_doodad(
            Position::default(),
            3,
            vec![DoodadFuncBinding::new(DoodadFuncKind(404), 0)],
        )
        .unwrap();
    let packet = CSUseDoodad {
        doodad_id: world.object_id(doodad).unwrap(),
        skill_id: 12,
    };

    let counter = EventCounter::default();
    let subscriber = tracing_subscriber::registry().with(counter.clone());
    let outcome = tracing::subscriber::with_default(subscriber, || {
        table.dispatch(&ctx, &frame_of(&packet))
    });

    assert_eq!(outcome, DispatchOutcome::Handled);
    assert_eq!(counter.count(), 1);
    assert_eq!(world.doodad_phase(doodad), Some(3));
    assert!(rx.try_recv().is_err());

    let summary = ctx.doodads().dispatch(&ctx, caster, doodad, 12).unwrap();
    assert_eq!(
        summary,
        FuncDispatch {
            invoked: 0,
            unimplemented: 1
        }
    );
}

// TCP end-to-end

struct Running {
    addr: SocketAddr,
    context: Arc<ServerContext>,
    shutdown: ShutdownState,
    handle: JoinHandle<Result<(), ServerError>>,
}

async fn start(config: ServerConfig) -> Running {
    start_with(config, None).await
}

async fn start_with(config: ServerConfig, dispatch: Option<DispatchTable>) -> Running {
    let world = Arc::new(InMemoryWorld::new(config.visibility_radius));
    let mut server = RealmServer::new(
        config,
        world.clone(),
        Arc::new(SpawnOnConnect::new(world.clone())),
    )
    .unwrap();
    if let Some(dispatch) = dispatch {
        server = server.with_dispatch(dispatch);
    }
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = ShutdownState::new();
    let context = server.context();
    let handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { server.serve(listener, shutdown).await })
    };
    Running {
        addr,
        context,
        shutdown,
        handle,
    }
}

async fn client(addr: SocketAddr) -> (FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>) {
    let (r, w) = TcpStream::connect(addr).await.unwrap().into_split();
    (FrameReader::new(r), FrameWriter::new(w))
}

async fn next_frame(reader: &mut FrameReader<OwnedReadHalf>) -> Option<Frame> {
    tokio::time::timeout(Duration::from_secs(5), reader.read_frame())
        .await
        .expect("timed out waiting for a frame")
        .ok()
        .flatten()
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never held");
}

fn attached(context: &ServerContext, count: usize) -> bool {
    (1..=count).all(|id| {
        context
            .manager
            .get(id)
            .is_some_and(|session| session.entity().is_some())
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn tcp_client_survives_unknown_opcode() {
    let running = start(ServerConfig::default()).await;
    let (mut reader, mut writer) = client(running.addr).await;
    wait_until(|| attached(&running.context, 1)).await;

    writer
        .write_frame(&Frame::new(0x00ee, 1, vec![0u8; 12]))
        .await
        .unwrap();
    writer
        .write_frame(&frame_of(&CSActiveWeaponChanged { active_weapon: 4 }))
        .await
        .unwrap();
    writer.flush().await.unwrap();

    let frame = next_frame(&mut reader).await.unwrap();
    let packet = SCActiveWeaponChanged::decode_frame(&frame.payload).unwrap();
    assert_eq!(packet.active_weapon, 4);

    running.shutdown.initiate_shutdown();
    running.handle.await.unwrap().unwrap();
    assert!(next_frame(&mut reader).await.is_none());
    let stats = running.context.manager.total_stats();
    assert_eq!(stats.unknown_opcodes, 1);
    assert_eq!(stats.frames_handled, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn frames_are_handled_in_order_per_connection() {
    const COUNT: usize = 100;
    let config = ServerConfig {
        outbound_queue_capacity: 4 * COUNT,
        ..Default::default()
    };
    let running = start(config).await;
    let (mut reader_a, writer_a) = client(running.addr).await;
    let (mut reader_b, writer_b) = client(running.addr).await;
    wait_until(|| attached(&running.context, 2)).await;

    let senders: Vec<_> = [writer_a, writer_b]
        .into_iter()
        .map(|mut writer| {
            tokio::spawn(async move {
                for slot in 0..COUNT {
                    let packet = CSActiveWeaponChanged {
                        active_weapon: slot as u8,
                    };
                    writer.write_frame(&frame_of(&packet)).await.unwrap();
                }
                writer.flush().await.unwrap();
                writer
            })
        })
        .collect();

    for reader in [&mut reader_a, &mut reader_b] {
        let mut by_object: HashMap<u32, Vec<u8>> = HashMap::new();
        for _ in 0..2 * COUNT {
            let frame = next_frame(reader).await.unwrap();
            let packet = SCActiveWeaponChanged::decode_frame(&frame.payload).unwrap();
            by_object
                .entry(packet.object_id)
                .or_default()
                .push(packet.active_weapon);
        }
        assert_eq!(by_object.len(), 2);
        let expected: Vec<u8> = (0..COUNT).map(|slot| slot as u8).collect();
        for slots in by_object.values() {
            assert_eq!(slots, &expected);
        }
    }

    for sender in senders {
        sender.await.unwrap();
    }
    running.shutdown.initiate_shutdown();
    running.handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn consecutive_decode_failures_close_the_connection() {
    let config = ServerConfig {
        max_decode_failures: 3,
        ..Default::default()
    };
    let running = start(config).await;
    let (mut reader, mut writer) = client(running.addr).await;
    wait_until(|| attached(&running.context, 1)).await;

    let truncated = Frame::new(CSActiveWeaponChanged::OPCODE, 1, Vec::<u8>::new());
    // A good frame in between resets the count.
    writer.write_frame(&truncated).await.unwrap();
    writer.write_frame(&truncated).await.unwrap();
    writer
        .write_frame(&frame_of(&CSActiveWeaponChanged { active_weapon: 1 }))
        .await
        .unwrap();
    writer.flush().await.unwrap();
    assert!(next_frame(&mut reader).await.is_some());
    assert!(!running.context.manager.is_empty());

    for _ in 0..3 {
        writer.write_frame(&truncated).await.unwrap();
    }
    writer.flush().await.unwrap();

    assert!(next_frame(&mut reader).await.is_none());
    wait_until(|| running.context.manager.is_empty()).await;
    assert_eq!(running.context.manager.total_stats().decode_failures, 5);

    running.shutdown.initiate_shutdown();
    running.handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn connections_beyond_the_limit_are_refused() {
    let config = ServerConfig {
        max_connections: 1,
        ..Default::default()
    };
    let running = start(config).await;
    let (_reader, _writer) = client(running.addr).await;
    wait_until(|| attached(&running.context, 1)).await;

    let (mut refused, _refused_writer) = client(running.addr).await;
    assert!(next_frame(&mut refused).await.is_none());
    assert_eq!(running.context.manager.len(), 1);

    running.shutdown.initiate_shutdown();
    running.handle.await.unwrap().unwrap();
    assert!(running.context.manager.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn configured_revision_decides_which_frames_are_routed() {
    let config = ServerConfig {
        protocol_revision: 2,
        ..Default::default()
    };
    let running = start(config).await;
    let (mut reader, mut writer) = client(running.addr).await;
    wait_until(|| attached(&running.context, 1)).await;

    let payload = vec![5u8];
    writer
        .write_frame(&Frame::new(CSActiveWeaponChanged::OPCODE, 1, payload.clone()))
        .await
        .unwrap();
    writer
        .write_frame(&Frame::new(CSActiveWeaponChanged::OPCODE, 2, payload))
        .await
        .unwrap();
    writer.flush().await.unwrap();

    // Only the frame at the session's revision reaches the handler.
    let frame = next_frame(&mut reader).await.unwrap();
    let packet = SCActiveWeaponChanged::decode_frame(&frame.payload).unwrap();
    assert_eq!(packet.active_weapon, 5);

    running.shutdown.initiate_shutdown();
    running.handle.await.unwrap().unwrap();
    assert!(next_frame(&mut reader).await.is_none());
    let stats = running.context.manager.total_stats();
    assert_eq!(stats.frames_handled, 1);
    assert_eq!(stats.unknown_opcodes, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn replacement_dispatch_table_is_used() {
    let mut table = DispatchTable::new();
    table
        .register::<CSActiveWeaponChanged, _>(|_, packet| {
            Err(HandlerError::domain(
                ErrorMessageType::NoPermission,
                u32::from(packet.active_weapon),
            ))
        })
        .unwrap();
    let running = start_with(ServerConfig::default(), Some(table)).await;
    let (mut reader, mut writer) = client(running.addr).await;
    wait_until(|| attached(&running.context, 1)).await;

    writer
        .write_frame(&frame_of(&CSUseDoodad {
            doodad_id: 1,
            skill_id: 0,
        }))
        .await
        .unwrap();
    writer
        .write_frame(&frame_of(&CSActiveWeaponChanged { active_weapon: 6 }))
        .await
        .unwrap();
    writer.flush().await.unwrap();

    let frame = next_frame(&mut reader).await.unwrap();
    assert_eq!(frame.opcode, SCErrorMsg::OPCODE);
    let msg = SCErrorMsg::decode_frame(&frame.payload).unwrap();
    assert_eq!(msg.error, ErrorMessageType::NoPermission);
    assert_eq!(msg.context, 6);

    running.shutdown.initiate_shutdown();
    running.handle.await.unwrap().unwrap();
    // The default use-doodad route is gone along with the rest of the table.
    assert_eq!(running.context.manager.total_stats().unknown_opcodes, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn stalled_peer_is_disconnected_after_teardown() {
    use tokio::io::AsyncReadExt;

    let (world, server, table) = harness();
    let (peer, mut client_end) = tokio::io::duplex(64);
    let (session, outbound) = server
        .manager
        .add_session("127.0.0.1:7000".parse().unwrap(), 1, 2);
    let limits = crate::server::ConnectionLimits {
        max_frame_payload: realm_protocol::MAX_PAYLOAD_LEN,
        max_decode_failures: 8,
        drain_grace: Duration::from_millis(100),
    };
    let task = tokio::spawn(crate::server::handle_connection(
        peer,
        session.clone(),
        outbound,
        server.clone(),
        Arc::new(table),
        Arc::new(SpawnOnConnect::new(world.clone())),
        limits,
    ));
    wait_until(|| session.entity().is_some()).await;
    let unit = session.entity().unwrap();

    // The client never reads: the socket buffer fills, then the queue.
    let packet = SCActiveWeaponChanged {
        object_id: world.object_id(unit).unwrap(),
        active_weapon: 1,
    };
    for _ in 0..200 {
        if session.is_closed() {
            break;
        }
        session.send(&packet).unwrap_or_else(|e| match e {
            SendError::Delivery(e) => server.manager.delivery_failed(&session, e, world.as_ref()),
            SendError::Encode(e) => panic!("encode failed: {e}"),
        });
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(session.is_closed());
    assert!(!world.contains(unit));

    tokio::time::timeout(Duration::from_secs(3), task)
        .await
        .expect("connection task outlived its teardown")
        .unwrap()
        .unwrap();

    // The socket is closed: whatever was buffered drains, then EOF.
    let mut buffered = Vec::new();
    tokio::time::timeout(Duration::from_secs(3), client_end.read_to_end(&mut buffered))
        .await
        .expect("socket left open")
        .unwrap();
    assert!(!buffered.is_empty());
}
