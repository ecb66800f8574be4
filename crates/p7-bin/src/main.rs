//! plan7 entrypoint: profile-HMM search drivers.
//!
//! Three commands share the engine crates: `search` scores one profile
//! against a FASTA database, `scan` scores query sequences against a
//! profile database with a worker pool, and `align` projects an existing
//! alignment through a profile.

mod fasta;
mod report;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use core_alphabet::{mask_repeats, Alphabet, AlphabetKind, DigitalSeq, Msa};
use core_dp::{align_alignment, forward, viterbi_auto};
use core_hits::{
    postprocess_significant_hit, trace_score_correction, Autocut, FancyAli, ScanMode,
    Thresholds, TopHits,
};
use core_hmmio::{gcg_checksum, HmmFile};
use core_matrix::DpMatrix;
use core_model::Plan7;
use core_trace::impose_master_trace;
use report::ReportOptions;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "p7", version, about = "Profile HMM alignment and search")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search one profile against a FASTA sequence database
    Search {
        hmmfile: PathBuf,
        seqfile: PathBuf,
        #[command(flatten)]
        opts: SearchOpts,
    },
    /// Scan query sequences against a profile database
    Scan {
        hmmfile: PathBuf,
        seqfile: PathBuf,
        #[command(flatten)]
        opts: SearchOpts,
    },
    /// Align an aligned FASTA file to a profile and reproject each row
    Align {
        hmmfile: PathBuf,
        alifile: PathBuf,
        /// nucleic acid model and alignment (default protein)
        #[arg(long)]
        nucleic: bool,
    },
}

#[derive(Args, Debug, Clone)]
struct SearchOpts {
    /// E-value cutoff for complete sequences
    #[arg(short = 'E', long = "glob-e")]
    glob_e: Option<f64>,
    /// Bit score cutoff for complete sequences
    #[arg(short = 'T', long = "glob-t")]
    glob_t: Option<f32>,
    /// E-value cutoff for individual domains
    #[arg(long = "dom-e")]
    dom_e: Option<f64>,
    /// Bit score cutoff for individual domains
    #[arg(long = "dom-t")]
    dom_t: Option<f32>,
    /// Effective database size for E-values
    #[arg(short = 'Z')]
    z: Option<usize>,
    /// Use Pfam GA gathering cutoffs
    #[arg(long)]
    cut_ga: bool,
    /// Use Pfam TC trusted cutoffs
    #[arg(long)]
    cut_tc: bool,
    /// Use Pfam NC noise cutoffs
    #[arg(long)]
    cut_nc: bool,
    /// Score with the full Forward algorithm instead of Viterbi
    #[arg(long)]
    forward: bool,
    /// Turn off the trace-dependent second null model
    #[arg(long = "no-null2")]
    no_null2: bool,
    /// Mask tandem repeats in query sequences (protein only)
    #[arg(long)]
    xnu: bool,
    /// Worker threads for scan; default one per CPU
    #[arg(long)]
    cpu: Option<usize>,
    /// Show accessions instead of names in reports
    #[arg(long)]
    acc: bool,
    /// Limit on rendered domain alignments
    #[arg(short = 'A', long = "ali-limit")]
    ali_limit: Option<usize>,
    /// Nucleic acid models and sequences (default protein)
    #[arg(long)]
    nucleic: bool,
    /// Configuration file path (overrides discovery of `plan7.toml`)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let _log_guard = configure_logging();
    install_panic_hook();
    let cli = Cli::parse();
    match cli.command {
        Command::Search {
            hmmfile,
            seqfile,
            opts,
        } => run_search(&hmmfile, &seqfile, &opts),
        Command::Scan {
            hmmfile,
            seqfile,
            opts,
        } => run_scan(&hmmfile, &seqfile, &opts),
        Command::Align {
            hmmfile,
            alifile,
            nucleic,
        } => run_align(&hmmfile, &alifile, nucleic),
    }
}

fn configure_logging() -> Option<WorkerGuard> {
    let file_appender = tracing_appender::rolling::never(".", "p7.log");
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(nb_writer)
        .try_init()
    {
        Ok(()) => Some(guard),
        Err(_) => None, // a global subscriber is already installed
    }
}

fn install_panic_hook() {
    let default = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        tracing::error!(target: "runtime", %panic, "panic");
        default(panic);
    }));
}

fn build_thresholds(
    cfg: &core_config::Config,
    opts: &SearchOpts,
) -> Result<Thresholds> {
    let mut t = Thresholds {
        glob_e: cfg.file.thresholds.glob_e,
        ..Thresholds::default()
    };
    if let Some(v) = cfg.file.thresholds.glob_t {
        t.glob_t = v;
    }
    if let Some(v) = cfg.file.thresholds.dom_e {
        t.dom_e = v;
    }
    if let Some(v) = cfg.file.thresholds.dom_t {
        t.dom_t = v;
    }
    if let Some(v) = opts.glob_e {
        t.glob_e = v;
    }
    if let Some(v) = opts.glob_t {
        t.glob_t = v;
    }
    if let Some(v) = opts.dom_e {
        t.dom_e = v;
    }
    if let Some(v) = opts.dom_t {
        t.dom_t = v;
    }
    t.z = opts.z;
    t.autocut = match (opts.cut_ga, opts.cut_tc, opts.cut_nc) {
        (false, false, false) => Autocut::None,
        (true, false, false) => Autocut::Ga,
        (false, true, false) => Autocut::Tc,
        (false, false, true) => Autocut::Nc,
        _ => bail!("--cut-ga, --cut-tc and --cut-nc are mutually exclusive"),
    };
    Ok(t)
}

fn alphabet_for(opts_nucleic: bool) -> Alphabet {
    Alphabet::new(if opts_nucleic {
        AlphabetKind::Nucleic
    } else {
        AlphabetKind::Amino
    })
}

fn prepare_query(abet: &Alphabet, seq: &[u8], xnu: bool) -> Result<DigitalSeq> {
    let mut dsq = abet.digitize(seq)?;
    if xnu && abet.kind() == AlphabetKind::Amino {
        let masked = mask_repeats(abet, &mut dsq);
        if masked > 0 {
            info!(target: "scan.xnu", masked, "masked repeat residues");
        }
    }
    Ok(dsq)
}

/// Report-stage thresholds: once autocuts replaced the bit thresholds per
/// model, the registered lists are already correct and E-value gating must
/// not second-guess them.
fn report_thresholds(thresh: &Thresholds) -> Thresholds {
    if thresh.autocut == Autocut::None {
        *thresh
    } else {
        Thresholds {
            glob_e: f64::INFINITY,
            glob_t: f32::NEG_INFINITY,
            dom_e: f64::INFINITY,
            dom_t: f32::NEG_INFINITY,
            ..*thresh
        }
    }
}

fn run_search(hmmfile: &Path, seqfile: &Path, opts: &SearchOpts) -> Result<()> {
    let cfg = core_config::load_from(opts.config.as_deref())?;
    let abet = alphabet_for(opts.nucleic);
    let mut thresh = build_thresholds(&cfg, opts)?;
    let ram_limit = cfg.file.memory.ram_limit_mb;

    let mut hmmfp = HmmFile::open(hmmfile)
        .with_context(|| format!("opening profile file {}", hmmfile.display()))?;
    let mut hmm = hmmfp
        .read_next(&abet)?
        .ok_or_else(|| anyhow!("no profile in {}", hmmfile.display()))?;
    hmm.logoddsify(&abet, !opts.forward);
    thresh.set_autocuts(&hmm)?;

    let records = fasta::read_fasta(BufReader::new(
        File::open(seqfile)
            .with_context(|| format!("opening sequence file {}", seqfile.display()))?,
    ))?;
    info!(target: "search", model = %hmm.name, nseq = records.len(), "search start");

    let mut ghit = TopHits::new();
    let mut dhit = TopHits::new();
    let mut mx = DpMatrix::new(300, 300, 25, 25);

    for rec in &records {
        let dsq = prepare_query(&abet, &rec.seq, opts.xnu)?;
        let l = dsq.len();
        let (mut sc, tr) = viterbi_auto(dsq.as_slice(), l, &hmm, &mut mx, true, ram_limit)?;
        if opts.forward {
            sc = forward(dsq.as_slice(), l, &hmm)?;
            if !opts.no_null2 {
                if let Some(tr) = &tr {
                    sc -= trace_score_correction(&hmm, tr, dsq.as_slice(), &abet);
                }
            }
        }
        let pvalue = hmm.pvalue(sc);
        let evalue = thresh.evalue(pvalue, records.len());
        if sc >= thresh.glob_t && evalue <= thresh.glob_e {
            postprocess_significant_hit(
                &mut ghit,
                &mut dhit,
                tr.as_ref(),
                &hmm,
                &abet,
                dsq.as_slice(),
                l,
                &rec.name,
                None,
                rec.desc.as_deref(),
                opts.forward,
                sc,
                !opts.no_null2,
                &thresh,
                ScanMode::ModelAgainstSeqs,
            )?;
        }
    }

    let mut out = std::io::stdout().lock();
    writeln!(out, "Query profile:  {}", hmm.name)?;
    writeln!(
        out,
        "Description:    {}",
        hmm.desc.as_deref().unwrap_or("[none]")
    )?;
    report::print_report(
        &mut out,
        &mut ghit,
        &mut dhit,
        &report_thresholds(&thresh),
        thresh.z.unwrap_or(records.len()),
        &ReportOptions {
            show_acc: opts.acc,
            ali_limit: opts.ali_limit.unwrap_or(usize::MAX),
        },
        "Sequence",
    )?;
    Ok(())
}

fn run_scan(hmmfile: &Path, seqfile: &Path, opts: &SearchOpts) -> Result<()> {
    let cfg = core_config::load_from(opts.config.as_deref())?;
    let abet = alphabet_for(opts.nucleic);
    let thresh = build_thresholds(&cfg, opts)?;
    let ram_limit = cfg.file.memory.ram_limit_mb;
    let threads = opts
        .cpu
        .or(cfg.file.run.threads)
        .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()))
        .max(1);

    let records = fasta::read_fasta(BufReader::new(
        File::open(seqfile)
            .with_context(|| format!("opening sequence file {}", seqfile.display()))?,
    ))?;

    let mut out = std::io::stdout().lock();
    for rec in &records {
        let dsq = prepare_query(&abet, &rec.seq, opts.xnu)?;
        let (mut ghit, mut dhit, nhmm) =
            scan_one(hmmfile, &abet, &dsq, &rec.name, opts, &thresh, ram_limit, threads)?;

        writeln!(out, "\nQuery sequence: {}", rec.name)?;
        writeln!(
            out,
            "Description:    {}",
            rec.desc.as_deref().unwrap_or("[none]")
        )?;
        report::print_report(
            &mut out,
            &mut ghit,
            &mut dhit,
            &report_thresholds(&thresh),
            thresh.z.unwrap_or(nhmm),
            &ReportOptions {
                show_acc: opts.acc,
                ali_limit: opts.ali_limit.unwrap_or(usize::MAX),
            },
            "Model",
        )?;
    }
    Ok(())
}

/// Scan one digitized sequence against every model in the database.
///
/// The open profile file is the shared input: the reader (this thread)
/// pulls models and feeds a bounded channel; each worker owns its DP matrix
/// and drains the channel; the two hit lists sit behind one mutex taken
/// only around the postprocessor.
#[allow(clippy::too_many_arguments)]
fn scan_one(
    hmmfile: &Path,
    abet: &Alphabet,
    dsq: &DigitalSeq,
    seqname: &str,
    opts: &SearchOpts,
    thresh: &Thresholds,
    ram_limit: usize,
    threads: usize,
) -> Result<(TopHits, TopHits, usize)> {
    let mut hmmfp = HmmFile::open(hmmfile)
        .with_context(|| format!("opening profile database {}", hmmfile.display()))?;
    let nhmm = AtomicUsize::new(0);
    let output = Mutex::new((TopHits::new(), TopHits::new()));
    let (tx, rx) = crossbeam_channel::bounded::<Plan7>(threads * 2);

    std::thread::scope(|scope| -> Result<()> {
        let mut handles = Vec::with_capacity(threads);
        for _ in 0..threads {
            let rx = rx.clone();
            let output = &output;
            let nhmm = &nhmm;
            handles.push(scope.spawn(move || {
                scan_worker(
                    rx, abet, dsq, seqname, opts, thresh, ram_limit, output, nhmm,
                )
            }));
        }
        drop(rx);

        // reader side: one puller on the shared model stream
        let mut read_err = None;
        loop {
            match hmmfp.read_next(abet) {
                Ok(Some(hmm)) => {
                    nhmm.fetch_add(1, Ordering::SeqCst);
                    if tx.send(hmm).is_err() {
                        break; // all workers died; their error surfaces below
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    read_err = Some(e);
                    break;
                }
            }
        }
        drop(tx);

        for handle in handles {
            handle
                .join()
                .map_err(|_| anyhow!("scan worker panicked"))??;
        }
        if let Some(e) = read_err {
            return Err(e).context("reading profile database");
        }
        Ok(())
    })?;

    let (ghit, dhit) = output.into_inner().expect("workers joined");
    Ok((ghit, dhit, nhmm.load(Ordering::SeqCst)))
}

#[allow(clippy::too_many_arguments)]
fn scan_worker(
    rx: crossbeam_channel::Receiver<Plan7>,
    abet: &Alphabet,
    dsq: &DigitalSeq,
    seqname: &str,
    opts: &SearchOpts,
    base_thresh: &Thresholds,
    ram_limit: usize,
    output: &Mutex<(TopHits, TopHits)>,
    nhmm: &AtomicUsize,
) -> Result<()> {
    let l = dsq.len();
    let mut mx = DpMatrix::new(300, 300, 25, 25);

    for mut hmm in rx {
        hmm.logoddsify(abet, !opts.forward);
        // autocuts change per model; work on a local copy
        let mut thresh = *base_thresh;
        thresh.set_autocuts(&hmm)?;

        let (mut sc, tr) =
            viterbi_auto(dsq.as_slice(), l, &hmm, &mut mx, true, ram_limit)?;
        if opts.forward {
            sc = forward(dsq.as_slice(), l, &hmm)?;
            if !opts.no_null2 {
                if let Some(tr) = &tr {
                    sc -= trace_score_correction(&hmm, tr, dsq.as_slice(), abet);
                }
            }
        }

        let pvalue = hmm.pvalue(sc);
        let searched = nhmm.load(Ordering::SeqCst).max(1);
        let evalue = thresh.evalue(pvalue, searched);
        if sc >= thresh.glob_t && evalue <= thresh.glob_e {
            let mut guard = output.lock().expect("output lock");
            let (ghit, dhit) = &mut *guard;
            postprocess_significant_hit(
                ghit,
                dhit,
                tr.as_ref(),
                &hmm,
                abet,
                dsq.as_slice(),
                l,
                seqname,
                None,
                None,
                opts.forward,
                sc,
                !opts.no_null2,
                &thresh,
                ScanMode::SeqAgainstModels,
            )?;
        }
    }
    Ok(())
}

fn run_align(hmmfile: &Path, alifile: &Path, nucleic: bool) -> Result<()> {
    let abet = alphabet_for(nucleic);
    let mut hmmfp = HmmFile::open(hmmfile)
        .with_context(|| format!("opening profile file {}", hmmfile.display()))?;
    let mut hmm = hmmfp
        .read_next(&abet)?
        .ok_or_else(|| anyhow!("no profile in {}", hmmfile.display()))?;
    hmm.logoddsify(&abet, true);

    let records = fasta::read_fasta(BufReader::new(
        File::open(alifile)
            .with_context(|| format!("opening alignment {}", alifile.display()))?,
    ))?;
    if records.is_empty() {
        bail!("no sequences in {}", alifile.display());
    }
    let alen = records[0].seq.len();
    if records.iter().any(|r| r.seq.len() != alen) {
        bail!("alignment rows differ in width; is this an aligned FASTA file?");
    }
    let msa = Msa::new(
        records.iter().map(|r| r.name.clone()).collect(),
        records.into_iter().map(|r| r.seq).collect(),
    );

    // a mapped model remembers the checksum of its training alignment
    if hmm.map.is_some() && hmm.checksum != 0 {
        let chk = gcg_checksum(&msa.rows);
        if chk != hmm.checksum {
            warn!(
                target: "align",
                file = chk,
                model = hmm.checksum,
                "alignment checksum does not match the model's training alignment"
            );
        }
    }

    let mtr = align_alignment(&msa, &hmm, &abet)?;
    let traces = impose_master_trace(&msa, &mtr);
    let dsqs = msa.digitize_rows(&abet);

    let mut out = std::io::stdout().lock();
    writeln!(out, "Alignment of {} sequences to {}:", msa.nseq(), hmm.name)?;
    for (i, tr) in traces.iter().enumerate() {
        let ali = FancyAli::new(tr, &hmm, dsqs[i].as_slice(), &abet, &msa.names[i]);
        writeln!(out)?;
        write!(out, "{ali}")?;
    }
    Ok(())
}
