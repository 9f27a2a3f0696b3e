use std::io::{stdin, stdout, Write};

use anyhow::Result;
use cache_sim::{
    addr::Addr,
    memory::BackingMemory,
    pattern::AccessPattern,
    plru::NUM_WAYS,
    sim::Simulator,
    stat::Rate,
};
use terminal_size::terminal_size;

peg::parser!(grammar command(memory_size: usize) for str {
    rule usize() -> usize
        = n:$(quiet!{['0'..='9']+}) {? n.parse().or(Err("usize")) }
        / expected!("usize")
    rule radix() -> usize
        = quiet!{"0" ['x' | 'X']} n:$(quiet!{['0'..='9'|'a'..='f'|'A'..='F']+})
        {? usize::from_str_radix(n, 16).or(Err("hexadecimal")) }
    rule number() -> usize
        = radix() / usize()
    rule addr() -> Addr
        = n:number() { Addr::new(n) }
    rule read() = "read" / "r"
    rule pattern() -> AccessPattern
        = ("sequential" / "seq") __ start:number() __ count:number() {
            AccessPattern::Sequential { start, count }
        }
        / ("strided" / "stride") __ start:number() __ stride:number() __ count:number() {
            AccessPattern::Strided { start, stride, count }
        }
        / "random" __ count:number() seed:(__ s:number() { s as u64 })? {
            AccessPattern::Random { count, memory_size, seed: seed.unwrap_or(0) }
        }
        / expected!("pattern (seq / stride / random)")
    rule command() -> Command
        = read() __ a:addr() { Command::Read(a) }
        / "preload" __ a:addr() __ n:number() { Command::Preload(a, n) }
        / ("decode" / "dec") __ a:addr() { Command::Decode(a) }
        / "set" __ i:number() { Command::ShowSet(i) }
        / "stat" "s"? { Command::Stat }
        / "reset" { Command::Reset }
        / "run" __ p:pattern() { Command::Run(p) }
        / ("help" / "h" / "?") { Command::Help }
        / ("exit" / "quit" / "q") { Command::Exit }
    pub(crate) rule parse_command() -> Command
        = _ c:command() _ { c }
        / expected!("command")

    rule ws() = quiet!{[' ' | '\t' | '\r' | '\n']}
        / expected!("whitespace")
    rule _() = ws()*
    rule __() = ws()+
});

pub(crate) enum Command {
    Read(Addr),
    Preload(Addr, usize),
    Decode(Addr),
    ShowSet(usize),
    Stat,
    Reset,
    Run(AccessPattern),
    Help,
    Exit,
}

const HELP: &str = "\
commands:
  read ADDR                  read one byte through the cache
  preload ADDR N             fill N blocks starting at ADDR (not counted)
  decode ADDR                show tag / set / offset of ADDR
  set IDX                    show the lines and PLRU bits of a set
  run seq START COUNT        replay a sequential pattern
  run stride START STRIDE N  replay a strided pattern
  run random COUNT [SEED]    replay a random pattern
  stat                       show statistics
  reset                      zero the hit / miss counters
  exit";

fn get_terminal_width() -> Option<u16> {
    terminal_size().map(|(w, _)| w.0.saturating_sub(20))
}

pub fn execute_interactive<M: BackingMemory>(sim: &mut Simulator<M>) -> Result<()> {
    let width = get_terminal_width().unwrap_or(60) as usize;
    let memory_size = sim.cache().memory().size();
    println!("entering interactive.");
    loop {
        let c = sim.cache();
        print!("[{} / {}] > ", c.hits(), c.misses());
        stdout().flush()?;
        let mut str = String::new();
        if stdin().read_line(&mut str)? == 0 {
            break Ok(());
        }
        let parsed = match command::parse_command(&str, memory_size) {
            Ok(p) => p,
            Err(e) => {
                println!("parse error: expected {}", e.expected);
                continue;
            }
        };
        match parsed {
            Command::Read(addr) => match sim.cache_mut().read_traced(addr) {
                Ok((v, access)) => println!("M[{addr}] == {v:#04x} ({access})"),
                Err(e) => println!("{e}"),
            },
            Command::Preload(addr, n) => match sim.cache_mut().preload(addr, n) {
                Ok(()) => println!("preloaded {n} blocks from {addr}"),
                Err(e) => println!("{e}"),
            },
            Command::Decode(addr) => {
                let d = sim.cache().decoder();
                println!("{addr}: {}, block {}", d.decode(addr), d.block_start(addr));
            }
            Command::ShowSet(i) => match sim.cache().sets().get(i) {
                Some(set) => {
                    let [b0, b1, b2] = set.plru().bits();
                    println!(
                        "set {i} ({}/{NUM_WAYS} valid), plru bits {}{}{}, next victim {}",
                        set.occupancy(),
                        b0 as u8,
                        b1 as u8,
                        b2 as u8,
                        set.victim()
                    );
                    for (way, line) in set.lines() {
                        match line.tag() {
                            Some(tag) => {
                                let head: Vec<_> =
                                    line.data().iter().take(8).map(|b| format!("{b:02x}")).collect();
                                println!("  {way}: tag {tag:#x} [{} ..]", head.join(" "));
                            }
                            None => println!("  {way}: invalid"),
                        }
                    }
                }
                None => println!(
                    "set {i} out of range (cache has {} sets)",
                    sim.cache().sets().len()
                ),
            },
            Command::Stat => {
                println!("{}", sim.collect_stat().view(width));
            }
            Command::Reset => {
                sim.cache_mut().reset_stats();
                println!("hit / miss counters cleared.");
            }
            Command::Run(p) => match sim.run(&p) {
                Ok(r) => println!("{r}"),
                Err(e) => println!("{e:#}"),
            },
            Command::Help => println!("{HELP}"),
            Command::Exit => {
                println!(
                    "overall hit rate: {}",
                    Rate(sim.overall().hit_rate())
                );
                break Ok(());
            }
        }
    }
}
