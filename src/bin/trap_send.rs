//! trap-send: emit a single SNMPv2c trap.
//!
//! Lab tool for exercising a trap receiver without real hardware: sends
//! sysUpTime, snmpTrapOID, sysName and one integer varbind.

use std::net::SocketAddr;
use std::process::ExitCode;

use clap::Parser;
use snmp_gateway::message::CommunityMessage;
use snmp_gateway::pdu::Pdu;
use snmp_gateway::value::Value;
use snmp_gateway::varbind::VarBind;
use snmp_gateway::{oid, Oid};
use tokio::net::UdpSocket;

/// Send one SNMPv2c trap to a receiver.
#[derive(Debug, Parser)]
#[command(name = "trap-send", version, about)]
struct Args {
    /// Trap receiver address.
    #[arg(long, default_value = "127.0.0.1:9162")]
    target: SocketAddr,

    /// SNMP community.
    #[arg(long, default_value = "public")]
    community: String,

    /// sysName.0 value.
    #[arg(long, default_value = "lab-switch")]
    sysname: String,

    /// Integer value to send.
    #[arg(long, default_value_t = 26)]
    value: i32,

    /// snmpTrapOID value.
    #[arg(long, default_value = ".1.3.6.1.6.3.1.1.5.1")]
    trap_oid: String,

    /// OID the value is bound to.
    #[arg(long, default_value = ".1.3.6.1.4.1.9.9.13.1.3.1.3.0")]
    value_oid: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let trap_oid = match Oid::parse(&args.trap_oid) {
        Ok(oid) => oid,
        Err(e) => {
            eprintln!("Error: bad trap OID: {e}");
            return ExitCode::FAILURE;
        }
    };
    let value_oid = match Oid::parse(&args.value_oid) {
        Ok(oid) => oid,
        Err(e) => {
            eprintln!("Error: bad value OID: {e}");
            return ExitCode::FAILURE;
        }
    };

    let varbinds = vec![
        VarBind::new(oid!(1, 3, 6, 1, 2, 1, 1, 3, 0), Value::TimeTicks(1)),
        VarBind::new(
            oid!(1, 3, 6, 1, 6, 3, 1, 1, 4, 1, 0),
            Value::ObjectIdentifier(trap_oid),
        ),
        VarBind::new(oid!(1, 3, 6, 1, 2, 1, 1, 5, 0), Value::from(args.sysname.as_str())),
        VarBind::new(value_oid, Value::Integer(args.value)),
    ];

    let message = CommunityMessage::v2c(args.community.as_bytes().to_vec(), Pdu::trap_v2(1, varbinds));

    let socket = match UdpSocket::bind("0.0.0.0:0").await {
        Ok(socket) => socket,
        Err(e) => {
            eprintln!("Error: bind failed: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = socket.send_to(&message.encode(), args.target).await {
        eprintln!("Error: send failed: {e}");
        return ExitCode::FAILURE;
    }

    println!("Trap sent to {}", args.target);
    ExitCode::SUCCESS
}
